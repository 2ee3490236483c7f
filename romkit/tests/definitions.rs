//! Sections built from TOML and JSON definitions behave like hand-built ones.

mod shop_image;

use std::sync::Arc;

use indexmap::IndexMap;
use romkit::{AddressMode, Library, Rom, SectionDef, TableDef, TypeDef};

const ITEMS: &str = r#"
representation = "tabular"

[type]
kind = "reader"
offset = 0xC01000

[type.type]
kind = "pointer_table"
offset = 0xC00000
count = 3
start = 0xC01100
warn = 0xC01200

[type.type.type]
kind = "struct"
fields = [
    { name = "name", type = { kind = "text", table = "font", terminator = 0 } },
    { name = "price", type = { kind = "uint", width = "word", radix = 10 } },
]
"#;

const DESCRIPTIONS: &str = r#"
representation = "yaml"

[type]
kind = "reader"
offset = 0xC02000

[type.type]
kind = "pointer_table"
offset = 0xC00000
count = 3
start = 0xC02100
warn = 0xC02180
type = { kind = "shared", name = "line" }
"#;

const SHOP: &str = r#"{
    "representation": "json",
    "type": {
        "kind": "reader",
        "offset": 12595200,
        "type": {
            "kind": "list",
            "count": 2,
            "type": { "kind": "enum_from", "section": "items", "path": ["name"] }
        }
    }
}"#;

const NAME_TABLE: &str = r#"
kind = "index_table"
table_at = 0xC04000

[table]
offset = 0xC00000
count = 2
start = 0xC04010
type = { kind = "text", table = "font", terminator = 0 }
"#;

const NAMES: &str = r#"
representation = "json"
type = { kind = "index_values", name = "names" }
"#;

const PARTY: &str = r#"
representation = "json"

[type]
kind = "reader"
offset = 0xC04100

[type.type]
kind = "list"
count = 3
type = { kind = "shared", name = "names" }
"#;

fn font_table() -> IndexMap<String, TableDef> {
    let font = shop_image::font()
        .iter()
        .map(|(value, label)| (format!("{value:#x}"), label.to_string()))
        .collect();
    let mut tables = IndexMap::new();
    tables.insert("font".to_string(), TableDef::Entries(font));
    tables
}

fn library() -> Arc<Library> {
    let tables = font_table();
    let line: TypeDef =
        toml::from_str("kind = \"text\"\ntable = \"font\"\nterminator = 0").unwrap();
    let mut shared = IndexMap::new();
    shared.insert("line".to_string(), line);

    Arc::new(Library::new(&tables, &shared).unwrap())
}

fn sections() -> IndexMap<String, SectionDef> {
    let mut sections = IndexMap::new();
    sections.insert("items".to_string(), SectionDef::from_toml(ITEMS).unwrap());
    sections.insert(
        "descriptions".to_string(),
        SectionDef::from_toml(DESCRIPTIONS).unwrap(),
    );
    sections.insert("shop".to_string(), SectionDef::from_json(SHOP).unwrap());
    sections
}

#[test]
fn test_definitions_match_hand_built_schema() {
    let mut defined = library().schema(sections());
    let mut built = shop_image::schema();

    let data = defined.decode(&mut shop_image::image()).unwrap();
    let expected = built.decode(&mut shop_image::image()).unwrap();
    assert_eq!(data, expected);
    assert_eq!(defined.format(&data).unwrap(), built.format(&expected).unwrap());
    assert_eq!(defined.extensions().unwrap(), built.extensions().unwrap());
}

#[test]
fn test_defined_schema_round_trips() {
    let rom = shop_image::image();
    let mut schema = library().schema(sections());
    let data = schema.decode(&mut rom.clone()).unwrap();
    let texts = schema.format(&data).unwrap();

    let parsed = schema.parse(&texts).unwrap();
    let out = schema.encode(&parsed, &rom).unwrap();
    assert_eq!(out.as_bytes(), rom.as_bytes());
}

#[test]
fn test_definitions_serialize_back() {
    let def = SectionDef::from_toml(ITEMS).unwrap();
    let json = serde_json::to_string(&def).unwrap();
    assert_eq!(SectionDef::from_json(&json).unwrap(), def);
}

fn party_image() -> Rom {
    let mut bytes = vec![0u8; 0x10000];
    bytes[0x4000..0x4004].copy_from_slice(&[0x10, 0x40, 0x15, 0x40]);
    bytes[0x4010..0x401B].copy_from_slice(b"KING\0ARMOR\0");
    bytes[0x4100..0x4103].copy_from_slice(&[1, 0, 1]);
    Rom::new(bytes, AddressMode::HiRom)
}

#[test]
fn test_index_table_sections_keep_layout() {
    let mut shared = IndexMap::new();
    shared.insert("names".to_string(), toml::from_str::<TypeDef>(NAME_TABLE).unwrap());
    let library = Arc::new(Library::new(&font_table(), &shared).unwrap());

    let mut sections = IndexMap::new();
    sections.insert("names".to_string(), SectionDef::from_toml(NAMES).unwrap());
    sections.insert("party".to_string(), SectionDef::from_toml(PARTY).unwrap());
    let mut schema = library.schema(sections);

    let rom = party_image();
    let data = schema.decode(&mut rom.clone()).unwrap();
    let texts = schema.format(&data).unwrap();
    assert_eq!(
        serde_json::from_str::<Vec<String>>(&texts["names"]).unwrap(),
        ["KING", "ARMOR"]
    );
    assert_eq!(
        serde_json::from_str::<Vec<String>>(&texts["party"]).unwrap(),
        ["1", "0", "1"]
    );

    let parsed = schema.parse(&texts).unwrap();
    let out = schema.encode(&parsed, &rom).unwrap();
    assert_eq!(out.as_bytes(), rom.as_bytes());
}
