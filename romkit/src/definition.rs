//! Declarative schema definitions
//!
//! Sections can be described as data instead of code. A definition file
//! holds one section: its representation and a `type` tree tagged by `kind`.
//!
//! ```toml
//! representation = "tabular"
//!
//! [type]
//! kind = "pointer_table"
//! offset = 0xC40000
//! count = 64
//!
//! [type.type]
//! kind = "struct"
//! fields = [
//!     { name = "name", type = { kind = "text", table = "font", length = 8, pad = 0xFF } },
//!     { name = "price", type = { kind = "uint", width = "word", radix = 10 } },
//! ]
//! ```
//!
//! Lookup tables and shared nodes (index tables used by several sections)
//! are declared once in a [`Library`] and referenced by name. A shared index
//! table's value list is a section of kind `index_values`.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Annotate, CodecError, Result};
use crate::lookup::Lookup;
use crate::representation::Representation;
use crate::rom::Width;
use crate::schema::{Resolver, Schema, Section};
use crate::types::graphics::DEFAULT_GLYPHS;
use crate::types::scalar::parse_radix;
use crate::types::table::DEFAULT_FILL;
use crate::types::{
    BitField, Bitmask, Bits, Char, Empty, Enum, EnumFrom, Field, Fixed, FlatStruct, Fork,
    ForkOption, Grid, IndexTable, LabelSource, List, ListSize, ParallelList, Placeholder, Pointer,
    PointerStruct, PointerTable, Presence, Reader, Rewind, Struct, Text, TextScript, Tile, TypeRef,
    UInt, node,
};
use crate::value::Value;

fn hex() -> u32 {
    16
}

fn word() -> Width {
    Width::Word
}

fn default_glyphs() -> String {
    DEFAULT_GLYPHS.to_string()
}

/// Contents of a lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableDef {
    /// Labels for raw values 0, 1, 2, ...
    Indexed(Vec<String>),
    /// Raw value (decimal, or hex with `0x`) to label
    Entries(IndexMap<String, String>),
}

impl TableDef {
    pub fn lookup(&self) -> Result<Lookup> {
        match self {
            TableDef::Indexed(labels) => Lookup::indexed(labels.iter().cloned()),
            TableDef::Entries(entries) => {
                let entries = entries
                    .iter()
                    .map(|(key, label)| Ok((parse_key(key)?, label.clone())))
                    .collect::<Result<Vec<_>>>()?;
                Lookup::new(entries)
            }
        }
    }
}

fn parse_key(key: &str) -> Result<u32> {
    let radix = if key.starts_with("0x") || key.starts_with("0X") {
        16
    } else {
        10
    };
    parse_radix(&Value::text(key), radix)
        .map_err(|e| CodecError::Definition(format!("table key {key:?}: {e}")))
}

/// A lookup table given inline or by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableRef {
    Named(String),
    Inline(TableDef),
}

/// Presence condition of a struct field. Exactly one test must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceDef {
    pub field: String,
    #[serde(default)]
    pub equals: Option<i64>,
    #[serde(default)]
    pub not_equals: Option<i64>,
    #[serde(default)]
    pub any_bits: Option<u32>,
}

impl PresenceDef {
    fn presence(&self) -> Result<Presence> {
        let field = self.field.clone();
        match (self.equals, self.not_equals, self.any_bits) {
            (Some(value), None, None) => Ok(Presence::Equals { field, value }),
            (None, Some(value), None) => Ok(Presence::NotEquals { field, value }),
            (None, None, Some(mask)) => Ok(Presence::AnyBits { field, mask }),
            _ => Err(CodecError::Definition(format!(
                "present_if on {:?} needs exactly one condition",
                self.field
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDef,
    #[serde(default)]
    pub present_if: Option<PresenceDef>,
    /// Item count of the field in a flat struct
    #[serde(default)]
    pub size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitFieldDef {
    pub name: String,
    pub mask: u32,
    #[serde(default, rename = "type")]
    pub ty: Option<TypeDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagDef {
    pub name: String,
    pub mask: u32,
}

/// A fork option or script command. Without a tag it is the default arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDef {
    #[serde(default)]
    pub tag: Option<u32>,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDef,
    #[serde(default)]
    pub use_control: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerTableDef {
    #[serde(rename = "type")]
    pub ty: Box<TypeDef>,
    pub offset: u32,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default = "word")]
    pub width: Width,
    #[serde(default)]
    pub start: Option<u32>,
    #[serde(default)]
    pub wrap: Option<u32>,
    #[serde(default)]
    pub warn: Option<u32>,
    #[serde(default)]
    pub fill: Option<u8>,
}

impl PointerTableDef {
    fn build(&self, builder: &mut Builder<'_>) -> Result<PointerTable> {
        let mut table = PointerTable::new(self.ty.build(builder)?, self.offset)
            .with_width(self.width)
            .with_fill(self.fill.unwrap_or(DEFAULT_FILL));
        if let Some(count) = self.count {
            table = table.sized(ListSize::Fixed(count));
        }
        if let Some(start) = self.start {
            table = table.with_start(start);
        }
        if let Some(wrap) = self.wrap {
            table = table.with_wrap(wrap);
        }
        if let Some(warn) = self.warn {
            table = table.with_warn(warn);
        }
        Ok(table)
    }
}

/// A schema node as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDef {
    #[serde(rename = "uint")]
    UInt {
        #[serde(default)]
        width: Width,
        #[serde(default = "hex")]
        radix: u32,
    },
    Fixed {
        value: u32,
        #[serde(default)]
        width: Width,
    },
    Enum {
        table: TableRef,
        #[serde(default)]
        width: Width,
    },
    Bool,
    Char {
        table: TableRef,
    },
    Empty,
    Placeholder {
        text: String,
    },
    Struct {
        fields: Vec<FieldDef>,
    },
    FlatStruct {
        fields: Vec<FieldDef>,
    },
    ParallelList {
        fields: Vec<FieldDef>,
    },
    Bits {
        fields: Vec<BitFieldDef>,
    },
    Bitmask {
        flags: Vec<FlagDef>,
        #[serde(default)]
        off: Option<String>,
    },
    Fork {
        #[serde(default)]
        control: Width,
        options: Vec<OptionDef>,
    },
    List {
        #[serde(rename = "type")]
        ty: Box<TypeDef>,
        #[serde(default)]
        count: Option<usize>,
        #[serde(default)]
        terminator: Option<i64>,
    },
    Grid {
        width: usize,
        height: usize,
        #[serde(default = "default_glyphs")]
        glyphs: String,
    },
    Text {
        table: TableRef,
        #[serde(default)]
        length: Option<usize>,
        #[serde(default)]
        terminator: Option<u8>,
        #[serde(default)]
        pad: Option<u8>,
    },
    TextScript {
        table: TableRef,
        commands: Vec<OptionDef>,
    },
    Tile {
        bpp: u8,
        #[serde(default = "default_glyphs")]
        glyphs: String,
    },
    Reader {
        offset: u32,
        #[serde(default)]
        warn: Option<u32>,
        #[serde(rename = "type")]
        ty: Box<TypeDef>,
    },
    Rewind {
        steps: u32,
        #[serde(rename = "type")]
        ty: Box<TypeDef>,
    },
    Pointer {
        #[serde(rename = "type")]
        ty: Box<TypeDef>,
        #[serde(default = "word")]
        width: Width,
        #[serde(default)]
        shift: u32,
        base: u32,
        #[serde(default)]
        warn: Option<u32>,
    },
    PointerStruct {
        offset: u32,
        #[serde(default = "word")]
        width: Width,
        #[serde(default)]
        shift: u32,
        fields: Vec<FieldDef>,
    },
    PointerTable(PointerTableDef),
    IndexTable {
        #[serde(default)]
        width: Width,
        table_at: u32,
        table: PointerTableDef,
    },
    EnumFrom(EnumFrom),
    /// A node declared once in the library
    Shared {
        name: String,
    },
    /// Value list of an index table declared in the library
    IndexValues {
        name: String,
    },
}

/// Named tables and shared nodes available to every definition.
#[derive(Debug, Clone, Default)]
pub struct Library {
    tables: IndexMap<String, Arc<Lookup>>,
    shared: IndexMap<String, TypeRef>,
    index_values: IndexMap<String, TypeRef>,
}

impl Library {
    /// Build tables first, then shared nodes in order. A shared node may use
    /// any table and any shared node declared before it.
    pub fn new(
        tables: &IndexMap<String, TableDef>,
        shared: &IndexMap<String, TypeDef>,
    ) -> Result<Self> {
        let mut library = Library::default();
        for (name, def) in tables {
            let lookup = def.lookup().within_with(|| format!("tables.{name}"))?;
            library.tables.insert(name.clone(), Arc::new(lookup));
        }
        for (name, def) in shared {
            let (ty, values) = library
                .build_shared(def)
                .within_with(|| format!("shared.{name}"))?;
            library.shared.insert(name.clone(), ty);
            if let Some(values) = values {
                library.index_values.insert(name.clone(), values);
            }
        }
        debug!(
            tables = library.tables.len(),
            shared = library.shared.len(),
            "Built definition library"
        );
        Ok(library)
    }

    /// A shared index table also publishes the node for its value list.
    fn build_shared(&self, def: &TypeDef) -> Result<(TypeRef, Option<TypeRef>)> {
        let mut builder = Builder::new(self, None);
        match def {
            TypeDef::IndexTable {
                width,
                table_at,
                table,
            } => {
                let index = IndexTable::new(*width, *table_at, table.build(&mut builder)?)?;
                let values = node(index.values());
                Ok((node(index), Some(values)))
            }
            def => Ok((def.build(&mut builder)?, None)),
        }
    }

    pub fn table(&self, name: &str) -> Result<Arc<Lookup>> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| CodecError::Definition(format!("unknown table {name:?}")))
    }

    pub fn shared(&self, name: &str) -> Result<TypeRef> {
        self.shared
            .get(name)
            .cloned()
            .ok_or_else(|| CodecError::Definition(format!("unknown shared node {name:?}")))
    }

    pub fn index_values(&self, name: &str) -> Result<TypeRef> {
        self.index_values
            .get(name)
            .cloned()
            .ok_or_else(|| CodecError::Definition(format!("no shared index table {name:?}")))
    }

    /// Schema whose sections are built from `sections` against this library.
    pub fn schema(self: &Arc<Self>, sections: IndexMap<String, SectionDef>) -> Schema {
        let mut schema = Schema::new();
        for (name, def) in sections {
            let library = Arc::clone(self);
            schema.insert(name, move |resolver: &mut Resolver<'_>| {
                def.section(&library, resolver)
            });
        }
        schema
    }
}

/// Build context: the library, plus a section source for label references.
pub struct Builder<'a> {
    library: &'a Library,
    source: Option<&'a mut dyn LabelSource>,
}

impl<'a> Builder<'a> {
    pub fn new(library: &'a Library, source: Option<&'a mut dyn LabelSource>) -> Self {
        Self { library, source }
    }

    fn table(&self, table: &TableRef) -> Result<Arc<Lookup>> {
        match table {
            TableRef::Named(name) => self.library.table(name),
            TableRef::Inline(def) => Ok(Arc::new(def.lookup()?)),
        }
    }

    fn labels(&mut self) -> Result<&mut (dyn LabelSource + 'a)> {
        self.source.as_deref_mut().ok_or_else(|| {
            CodecError::Definition("labels from another section are only available in a section".into())
        })
    }
}

fn fields(defs: &[FieldDef], builder: &mut Builder<'_>) -> Result<Vec<Field>> {
    defs.iter()
        .map(|def| {
            let mut field = Field::new(&def.name, def.ty.build(builder).within(&def.name)?);
            if let Some(presence) = &def.present_if {
                field = field.when(presence.presence().within(&def.name)?);
            }
            Ok(field)
        })
        .collect()
}

fn options(defs: &[OptionDef], builder: &mut Builder<'_>) -> Result<Vec<ForkOption>> {
    defs.iter()
        .map(|def| {
            let ty = def.ty.build(builder).within(&def.name)?;
            Ok(match def.tag {
                Some(tag) if def.use_control => ForkOption::tagged(tag, &def.name, ty).using_control(),
                Some(tag) => ForkOption::tagged(tag, &def.name, ty),
                None => ForkOption::default(&def.name, ty),
            })
        })
        .collect()
}

impl TypeDef {
    pub fn build(&self, builder: &mut Builder<'_>) -> Result<TypeRef> {
        let ty = match self {
            TypeDef::UInt { width, radix } => {
                if ![2, 8, 10, 16].contains(radix) {
                    return Err(CodecError::Definition(format!("unsupported radix {radix}")));
                }
                node(UInt::new(*width, *radix))
            }
            TypeDef::Fixed { value, width } => {
                if *value > width.max() {
                    return Err(CodecError::Definition(format!(
                        "constant {value:#x} does not fit in {} byte(s)",
                        width.bytes()
                    )));
                }
                node(Fixed::new(*value, *width))
            }
            TypeDef::Enum { table, width } => node(Enum::shared(*width, builder.table(table)?)),
            TypeDef::Bool => node(Enum::boolean()),
            TypeDef::Char { table } => node(Char::new(builder.table(table)?)),
            TypeDef::Empty => node(Empty),
            TypeDef::Placeholder { text } => node(Placeholder::new(text)),
            TypeDef::Struct { fields: defs } => node(Struct::new(fields(defs, builder)?)?),
            TypeDef::FlatStruct { fields: defs } => {
                let sizes = defs
                    .iter()
                    .map(|def| {
                        def.size.ok_or_else(|| {
                            CodecError::Definition(format!(
                                "flat struct field {:?} needs a size",
                                def.name
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let fields = fields(defs, builder)?;
                node(FlatStruct::new(fields.into_iter().zip(sizes).collect())?)
            }
            TypeDef::ParallelList { fields: defs } => node(ParallelList::new(fields(defs, builder)?)?),
            TypeDef::Bits { fields } => {
                let fields = fields
                    .iter()
                    .map(|def| {
                        let field = BitField::new(&def.name, def.mask);
                        Ok(match &def.ty {
                            Some(ty) => field.typed(ty.build(builder).within(&def.name)?),
                            None => field,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                node(Bits::new(fields)?)
            }
            TypeDef::Bitmask { flags, off } => {
                let flags = flags.iter().map(|f| (f.mask, f.name.clone())).collect();
                node(Bitmask::new(flags, off.clone())?)
            }
            TypeDef::Fork { control, options: defs } => {
                node(Fork::new(*control, options(defs, builder)?)?)
            }
            TypeDef::List {
                ty,
                count,
                terminator,
            } => {
                let size = match (count, terminator) {
                    (Some(count), None) => ListSize::Fixed(*count),
                    (None, Some(end)) => ListSize::Terminator(Value::Int(*end)),
                    _ => {
                        return Err(CodecError::Definition(
                            "list needs either a count or a terminator".into(),
                        ));
                    }
                };
                node(List::new(ty.build(builder).within("List")?, size))
            }
            TypeDef::Grid {
                width,
                height,
                glyphs,
            } => node(Grid::with_chars(*width, *height, glyphs)?),
            TypeDef::Text {
                table,
                length,
                terminator,
                pad,
            } => {
                let table = builder.table(table)?;
                match (length, terminator) {
                    (Some(length), None) => node(Text::fixed(*length, table, *pad)),
                    (None, Some(end)) if pad.is_none() => node(Text::terminated(*end, table)),
                    _ => {
                        return Err(CodecError::Definition(
                            "text needs a length (optionally padded) or a terminator".into(),
                        ));
                    }
                }
            }
            TypeDef::TextScript { table, commands } => {
                if let Some(def) = commands.iter().find(|c| c.tag.is_none()) {
                    return Err(CodecError::Definition(format!(
                        "script command {:?} needs a tag",
                        def.name
                    )));
                }
                let table = builder.table(table)?;
                node(TextScript::new(table, options(commands, builder)?)?)
            }
            TypeDef::Tile { bpp, glyphs } => node(Tile::new(*bpp, glyphs)?),
            TypeDef::Reader { offset, warn, ty } => {
                let reader = Reader::new(*offset, ty.build(builder)?);
                node(match warn {
                    Some(warn) => reader.with_warn(*warn),
                    None => reader,
                })
            }
            TypeDef::Rewind { steps, ty } => node(Rewind::new(*steps, ty.build(builder)?)),
            TypeDef::Pointer {
                ty,
                width,
                shift,
                base,
                warn,
            } => {
                let pointer = Pointer::new(ty.build(builder)?, *width, *shift, *base);
                node(match warn {
                    Some(warn) => pointer.with_warn(*warn),
                    None => pointer,
                })
            }
            TypeDef::PointerStruct {
                offset,
                width,
                shift,
                fields: defs,
            } => {
                let fields = defs
                    .iter()
                    .map(|def| Ok((def.name.clone(), def.ty.build(builder).within(&def.name)?)))
                    .collect::<Result<Vec<_>>>()?;
                node(PointerStruct::new(*offset, *width, *shift, fields))
            }
            TypeDef::PointerTable(def) => node(def.build(builder)?),
            TypeDef::IndexTable {
                width,
                table_at,
                table,
            } => node(IndexTable::new(*width, *table_at, table.build(builder)?)?),
            TypeDef::EnumFrom(reference) => node(reference.build(builder.labels()?)?),
            TypeDef::Shared { name } => builder.library.shared(name)?,
            TypeDef::IndexValues { name } => builder.library.index_values(name)?,
        };
        Ok(ty)
    }
}

/// One section: how it is stored on disk and what it contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionDef {
    #[serde(default)]
    pub representation: Representation,
    #[serde(rename = "type")]
    pub ty: TypeDef,
}

impl SectionDef {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| CodecError::Definition(format!("TOML: {e}")))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| CodecError::Definition(format!("JSON: {e}")))
    }

    /// Build the section, fetching referenced sections through `resolver`.
    pub fn section(&self, library: &Library, resolver: &mut Resolver<'_>) -> Result<Section> {
        let codec = self.ty.build(&mut Builder::new(library, Some(resolver as &mut dyn LabelSource)))?;
        Ok(Section::new(codec, self.representation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map;
    use crate::pass::Pass;
    use crate::rom::{AddressMode, Rom};

    const ITEMS: &str = r#"
representation = "tabular"

[type]
kind = "reader"
offset = 0xC00000

[type.type]
kind = "list"
count = 2

[type.type.type]
kind = "struct"
fields = [
    { name = "kind", type = { kind = "enum", table = "kinds" } },
    { name = "power", type = { kind = "uint", radix = 10 }, present_if = { field = "kind", equals = 1 } },
]
"#;

    fn library() -> Arc<Library> {
        let mut tables = IndexMap::new();
        tables.insert(
            "kinds".to_string(),
            TableDef::Indexed(vec!["junk".into(), "weapon".into()]),
        );
        Arc::new(Library::new(&tables, &IndexMap::new()).unwrap())
    }

    #[test]
    fn test_toml_section_builds() {
        let def = SectionDef::from_toml(ITEMS).unwrap();
        assert_eq!(def.representation, Representation::Tabular);

        let mut sections = IndexMap::new();
        sections.insert("items".to_string(), def);
        let mut schema = library().schema(sections);

        let mut rom = Rom::new(vec![1, 9, 0, 0], AddressMode::HiRom);
        let data = schema.decode(&mut rom).unwrap();
        let formatted = schema.format_values(&data).unwrap();
        assert_eq!(
            formatted["items"],
            Value::List(vec![
                map! { "kind" => "weapon", "power" => "9" },
                map! { "kind" => "junk", "power" => Value::Null },
            ])
        );
    }

    #[test]
    fn test_json_section_and_inline_tables() {
        let def = SectionDef::from_json(
            r#"{
                "type": {
                    "kind": "enum",
                    "width": "word",
                    "table": { "0x10": "low", "0x2000": "high" }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(def.representation, Representation::Json);

        let ty = def.ty.build(&mut Builder::new(&Library::default(), None)).unwrap();
        let mut rom = Rom::new(vec![0x00, 0x20], AddressMode::HiRom);
        let raw = ty.decode(&mut rom, &mut Pass::new()).unwrap();
        assert_eq!(ty.format(&raw).unwrap(), Value::text("high"));
    }

    #[test]
    fn test_shared_nodes_are_one_instance() {
        let mut shared = IndexMap::new();
        shared.insert("flag".to_string(), TypeDef::Bool);
        let library = Library::new(&IndexMap::new(), &shared).unwrap();

        let def = TypeDef::Shared { name: "flag".into() };
        let a = def.build(&mut Builder::new(&library, None)).unwrap();
        let b = def.build(&mut Builder::new(&library, None)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_definition_errors() {
        let library = Library::default();
        let build = |def: TypeDef| def.build(&mut Builder::new(&library, None)).unwrap_err();

        let unknown = build(TypeDef::Char {
            table: TableRef::Named("font".into()),
        });
        assert!(matches!(unknown, CodecError::Definition(_)));

        let no_table = build(TypeDef::IndexValues {
            name: "names".into(),
        });
        assert!(matches!(no_table, CodecError::Definition(_)));

        let both = build(TypeDef::List {
            ty: Box::new(TypeDef::Bool),
            count: Some(2),
            terminator: Some(0),
        });
        assert!(matches!(both, CodecError::Definition(_)));

        let presence = build(TypeDef::Struct {
            fields: vec![FieldDef {
                name: "a".into(),
                ty: TypeDef::Bool,
                present_if: Some(PresenceDef {
                    field: "b".into(),
                    equals: Some(1),
                    not_equals: Some(2),
                    any_bits: None,
                }),
                size: None,
            }],
        });
        assert_eq!(presence.path(), vec!["a"]);

        let labels = build(TypeDef::EnumFrom(EnumFrom::new("items", &["name"])));
        assert!(matches!(labels, CodecError::Definition(_)));

        assert!(SectionDef::from_toml("[type]\nkind = \"nope\"").is_err());
    }

    #[test]
    fn test_table_keys() {
        let mut entries = IndexMap::new();
        entries.insert("0x41".to_string(), "A".to_string());
        entries.insert("66".to_string(), "B".to_string());
        let lookup = TableDef::Entries(entries).lookup().unwrap();
        assert_eq!(lookup.value("A").unwrap(), 0x41);
        assert_eq!(lookup.label(66).unwrap(), "B");

        let mut bad = IndexMap::new();
        bad.insert("zz".to_string(), "A".to_string());
        assert!(TableDef::Entries(bad).lookup().is_err());
    }
}
