//! Record nodes: field structs and their flattened/transposed variants

use std::fmt;
use std::sync::Arc;

use crate::error::{Annotate, CodecError, Result};
use crate::pass::Pass;
use crate::rom::Rom;
use crate::schema::Optimizer;
use crate::types::{Codec, TypeRef};
use crate::value::{Fields, NULL, Value};

/// Condition on earlier sibling fields deciding whether a field is stored.
#[derive(Clone)]
pub enum Presence {
    /// Sibling equals a value
    Equals { field: String, value: i64 },
    /// Sibling differs from a value
    NotEquals { field: String, value: i64 },
    /// Sibling has any of the mask bits set
    AnyBits { field: String, mask: u32 },
    /// Arbitrary predicate over the raw sibling values
    Custom(Arc<dyn Fn(&Fields) -> bool + Send + Sync>),
}

impl Presence {
    pub fn holds(&self, siblings: &Fields) -> bool {
        let int = |name: &str| siblings.get(name).and_then(|v| v.as_int().ok());
        match self {
            Presence::Equals { field, value } => int(field) == Some(*value),
            Presence::NotEquals { field, value } => int(field) != Some(*value),
            Presence::AnyBits { field, mask } => {
                int(field).is_some_and(|v| v & *mask as i64 != 0)
            }
            Presence::Custom(predicate) => predicate(siblings),
        }
    }
}

impl fmt::Debug for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Presence::Equals { field, value } => write!(f, "{field} == {value}"),
            Presence::NotEquals { field, value } => write!(f, "{field} != {value}"),
            Presence::AnyBits { field, mask } => write!(f, "{field} & {mask:#x}"),
            Presence::Custom(_) => f.write_str("<custom>"),
        }
    }
}

/// Named struct field.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
    pub presence: Option<Presence>,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            presence: None,
        }
    }

    pub fn when(mut self, presence: Presence) -> Self {
        self.presence = Some(presence);
        self
    }

    fn present(&self, siblings: &Fields) -> bool {
        self.presence.as_ref().is_none_or(|p| p.holds(siblings))
    }
}

/// Ordered fields stored back to back.
///
/// Presence predicates always see raw values, in every direction. Absent
/// fields are null and take no bytes.
#[derive(Debug, Clone)]
pub struct Struct {
    pub fields: Vec<Field>,
}

impl Struct {
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(CodecError::Definition(format!(
                    "duplicate struct field {:?}",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }
}

impl Codec for Struct {
    fn decode(&self, rom: &mut Rom, pass: &mut Pass) -> Result<Value> {
        let mut data = Fields::new();
        for field in &self.fields {
            let value = if field.present(&data) {
                field.ty.decode(rom, pass).within(&field.name)?
            } else {
                Value::Null
            };
            data.insert(field.name.clone(), value);
        }
        Ok(Value::Map(data))
    }

    fn encode(&self, value: &Value, rom: &mut Rom, pass: &mut Pass) -> Result<()> {
        let data = value.as_map()?;
        for field in &self.fields {
            if field.present(data) {
                let item = data.get(&field.name).unwrap_or(&NULL);
                field.ty.encode(item, rom, pass).within(&field.name)?;
            }
        }
        Ok(())
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        let json = external.as_map()?;
        let mut data = Fields::new();
        for field in &self.fields {
            let value = if field.present(&data) {
                let item = json.get(&field.name).unwrap_or(&NULL);
                field.ty.parse(item).within(&field.name)?
            } else {
                Value::Null
            };
            data.insert(field.name.clone(), value);
        }
        Ok(Value::Map(data))
    }

    fn format(&self, value: &Value) -> Result<Value> {
        let data = value.as_map()?;
        let mut json = Fields::new();
        for field in &self.fields {
            let item = if field.present(data) {
                let raw = data.get(&field.name).unwrap_or(&NULL);
                field.ty.format(raw).within(&field.name)?
            } else {
                Value::Null
            };
            json.insert(field.name.clone(), item);
        }
        Ok(Value::Map(json))
    }

    fn optimize(&self, value: &Value, optimizer: &mut Optimizer<'_>) -> Result<Value> {
        let data = value.as_map()?;
        let mut out = Fields::new();
        for field in &self.fields {
            let raw = data.get(&field.name).unwrap_or(&NULL);
            let item = if raw.is_null() {
                Value::Null
            } else {
                field.ty.optimize(raw, optimizer).within(&field.name)?
            };
            out.insert(field.name.clone(), item);
        }
        Ok(Value::Map(out))
    }

    fn child(&self, name: &str) -> Option<TypeRef> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.ty.clone())
    }
}

/// Struct whose external form is a single flat list.
///
/// Each field formats to a list of exactly its declared size; the lists are
/// concatenated in field order.
#[derive(Debug, Clone)]
pub struct FlatStruct {
    pub inner: Struct,
    pub sizes: Vec<usize>,
}

impl FlatStruct {
    pub fn new(fields: Vec<(Field, usize)>) -> Result<Self> {
        let (fields, sizes): (Vec<_>, Vec<_>) = fields.into_iter().unzip();
        Ok(Self {
            inner: Struct::new(fields)?,
            sizes,
        })
    }
}

impl Codec for FlatStruct {
    fn decode(&self, rom: &mut Rom, pass: &mut Pass) -> Result<Value> {
        self.inner.decode(rom, pass)
    }

    fn encode(&self, value: &Value, rom: &mut Rom, pass: &mut Pass) -> Result<()> {
        self.inner.encode(value, rom, pass)
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        let list = external.as_list()?;
        let total: usize = self.sizes.iter().sum();
        if list.len() != total {
            return Err(CodecError::Validation(format!(
                "flat struct expects {total} items, found {}",
                list.len()
            )));
        }

        let mut json = Fields::new();
        let mut start = 0;
        for (field, size) in self.inner.fields.iter().zip(&self.sizes) {
            json.insert(field.name.clone(), Value::List(list[start..start + size].to_vec()));
            start += size;
        }
        self.inner.parse(&Value::Map(json))
    }

    fn format(&self, value: &Value) -> Result<Value> {
        let json = self.inner.format(value)?;
        let json = json.as_map()?;
        let mut flat = Vec::new();
        for (field, size) in self.inner.fields.iter().zip(&self.sizes) {
            let items = json.get(&field.name).unwrap_or(&NULL).as_list().within(&field.name)?;
            if items.len() != *size {
                return Err(CodecError::Validation(format!(
                    "expected {size} items, found {}",
                    items.len()
                ))
                .within(&field.name));
            }
            flat.extend(items.iter().cloned());
        }
        Ok(Value::List(flat))
    }

    fn optimize(&self, value: &Value, optimizer: &mut Optimizer<'_>) -> Result<Value> {
        self.inner.optimize(value, optimizer)
    }

    fn child(&self, name: &str) -> Option<TypeRef> {
        self.inner.child(name)
    }
}

/// Struct of equally long lists shown externally as one list of records.
#[derive(Debug, Clone)]
pub struct ParallelList {
    pub inner: Struct,
}

impl ParallelList {
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        Ok(Self {
            inner: Struct::new(fields)?,
        })
    }
}

impl Codec for ParallelList {
    fn decode(&self, rom: &mut Rom, pass: &mut Pass) -> Result<Value> {
        self.inner.decode(rom, pass)
    }

    fn encode(&self, value: &Value, rom: &mut Rom, pass: &mut Pass) -> Result<()> {
        self.inner.encode(value, rom, pass)
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        let records = external.as_list()?;
        let mut json = Fields::new();
        for field in &self.inner.fields {
            let column = records
                .iter()
                .enumerate()
                .map(|(i, record)| {
                    record
                        .field(&field.name)
                        .cloned()
                        .within_with(|| format!("List({i})"))
                })
                .collect::<Result<Vec<_>>>()?;
            json.insert(field.name.clone(), Value::List(column));
        }
        self.inner.parse(&Value::Map(json))
    }

    fn format(&self, value: &Value) -> Result<Value> {
        let json = self.inner.format(value)?;
        let json = json.as_map()?;
        let mut records: Vec<Fields> = Vec::new();
        for field in &self.inner.fields {
            let column = json.get(&field.name).unwrap_or(&NULL).as_list().within(&field.name)?;
            if records.is_empty() {
                records.resize_with(column.len(), Fields::new);
            } else if column.len() != records.len() {
                return Err(CodecError::Validation(format!(
                    "parallel list column has {} items, expected {}",
                    column.len(),
                    records.len()
                ))
                .within(&field.name));
            }
            for (record, item) in records.iter_mut().zip(column) {
                record.insert(field.name.clone(), item.clone());
            }
        }
        Ok(Value::List(records.into_iter().map(Value::Map).collect()))
    }

    fn optimize(&self, value: &Value, optimizer: &mut Optimizer<'_>) -> Result<Value> {
        self.inner.optimize(value, optimizer)
    }

    fn child(&self, name: &str) -> Option<TypeRef> {
        self.inner.child(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map;
    use crate::rom::{AddressMode, Width};
    use crate::types::{List, ListSize, UInt, node};

    fn rom(bytes: &[u8]) -> Rom {
        let mut data = bytes.to_vec();
        data.resize(0x40, 0);
        let mut rom = Rom::new(data, AddressMode::HiRom);
        rom.seek(0xC00000).unwrap();
        rom
    }

    fn flagged_struct() -> Struct {
        Struct::new(vec![
            Field::new("kind", node(UInt::decimal(Width::Byte))),
            Field::new("power", node(UInt::hex(Width::Word))).when(Presence::Equals {
                field: "kind".into(),
                value: 1,
            }),
            Field::new("tail", node(UInt::hex(Width::Byte))),
        ])
        .unwrap()
    }

    #[test]
    fn test_presence_controls_layout() {
        let codec = flagged_struct();
        let mut pass = Pass::new();

        let mut with = rom(&[1, 0x34, 0x12, 0x99]);
        let value = codec.decode(&mut with, &mut pass).unwrap();
        assert_eq!(value, map! { "kind" => 1i64, "power" => 0x1234i64, "tail" => 0x99i64 });
        assert_eq!(with.offset().unwrap(), 0xC00004);

        let mut without = rom(&[0, 0x99]);
        let value = codec.decode(&mut without, &mut pass).unwrap();
        assert_eq!(value, map! { "kind" => 0i64, "power" => Value::Null, "tail" => 0x99i64 });
        assert_eq!(without.offset().unwrap(), 0xC00002);

        let mut out = rom(&[]);
        codec.encode(&value, &mut out, &mut pass).unwrap();
        assert_eq!(&out.as_bytes()[..3], &[0, 0x99, 0]);

        let formatted = codec.format(&value).unwrap();
        assert_eq!(formatted.field("power").unwrap(), &Value::Null);
        assert_eq!(codec.parse(&formatted).unwrap(), value);
    }

    #[test]
    fn test_errors_carry_field_path() {
        let codec = flagged_struct();
        let err = codec
            .parse(&map! { "kind" => "1", "power" => "zz", "tail" => "0" })
            .unwrap_err();
        assert_eq!(err.path(), vec!["power"]);
        assert!(matches!(err.root(), CodecError::ParseFormat(_)));
    }

    #[test]
    fn test_duplicate_fields_rejected() {
        let result = Struct::new(vec![
            Field::new("a", node(UInt::default())),
            Field::new("a", node(UInt::default())),
        ]);
        assert!(matches!(result, Err(CodecError::Definition(_))));
    }

    #[test]
    fn test_flat_struct() {
        let triple = || node(List::new(node(UInt::decimal(Width::Byte)), ListSize::Fixed(3)));
        let pair = node(List::new(node(UInt::decimal(Width::Byte)), ListSize::Fixed(2)));
        let codec = FlatStruct::new(vec![(Field::new("a", triple()), 3), (Field::new("b", pair), 2)])
            .unwrap();

        let mut pass = Pass::new();
        let value = codec.decode(&mut rom(&[1, 2, 3, 4, 5]), &mut pass).unwrap();
        let flat = codec.format(&value).unwrap();
        assert_eq!(flat.as_list().unwrap().len(), 5);
        assert_eq!(flat.as_list().unwrap()[3], Value::text("4"));
        assert_eq!(codec.parse(&flat).unwrap(), value);
        assert!(codec.parse(&Value::List(vec![])).is_err());
    }

    #[test]
    fn test_parallel_list() {
        let column = || node(List::new(node(UInt::decimal(Width::Byte)), ListSize::Fixed(2)));
        let codec = ParallelList::new(vec![Field::new("hp", column()), Field::new("mp", column())])
            .unwrap();

        let mut pass = Pass::new();
        let value = codec.decode(&mut rom(&[10, 20, 1, 2]), &mut pass).unwrap();
        let records = codec.format(&value).unwrap();
        assert_eq!(
            records,
            Value::List(vec![
                map! { "hp" => "10", "mp" => "1" },
                map! { "hp" => "20", "mp" => "2" },
            ])
        );
        assert_eq!(codec.parse(&records).unwrap(), value);
    }
}
