use super::*;
use crate::map;
use crate::rom::{AddressMode, Width};
use crate::types::reference::EnumFrom;
use crate::types::structs::Field;
use crate::types::{Codec, List, ListSize, Reader, Struct, Text, UInt, node};
use crate::lookup::Lookup;

fn table() -> Arc<Lookup> {
    Arc::new(Lookup::indexed(["A", "B", "C", "D", "E", "F", "G", "H"]).unwrap())
}

/// Two item names at 0xC00000, then one shop slot at 0xC00010 naming an item.
fn image() -> Rom {
    let mut bytes = vec![0u8; 0x40];
    bytes[..4].copy_from_slice(&[0, 1, 2, 3]);
    bytes[0x10] = 1;
    Rom::new(bytes, AddressMode::HiRom)
}

fn schema() -> Schema {
    let mut schema = Schema::new();
    schema.insert("shop", |resolver: &mut Resolver<'_>| {
        let items = EnumFrom::new("items", &["name"]).build(resolver)?;
        let slots = List::new(node(items), ListSize::Fixed(1));
        Ok(Section::new(
            node(Reader::new(0xC00010, node(slots))),
            Representation::Json,
        ))
    });
    let record = Struct::new(vec![Field::new("name", node(Text::fixed(2, table(), None)))]).unwrap();
    let items = List::new(node(record), ListSize::Fixed(2));
    schema.insert_node(
        "items",
        node(Reader::new(0xC00000, node(items))),
        Representation::Tabular,
    );
    schema
}

#[test]
fn test_sections_resolve_dependencies() {
    let mut schema = schema();
    let data = schema.decode(&mut image()).unwrap();

    // Declaration order is kept even though "items" resolved first.
    assert_eq!(data.keys().collect::<Vec<_>>(), vec!["shop", "items"]);

    let texts = schema.format(&data).unwrap();
    assert_eq!(texts["items"], "name\nAB\nCD");
    assert_eq!(texts["shop"], "[\n    \"CD\"\n]");
    assert_eq!(schema.extensions().unwrap()["items"], "tsv");
}

#[test]
fn test_round_trip_through_text() {
    let rom = image();
    let mut schema = schema();
    let data = schema.decode(&mut rom.clone()).unwrap();
    let mut texts = schema.format(&data).unwrap();

    texts.insert("items".into(), "name\nHG\nCD".into());
    texts.insert("shop".into(), "[\"HG\"]".into());

    let mut reparsed = self::schema();
    let edited = reparsed.parse(&texts).unwrap();
    let out = reparsed.encode(&edited, &rom).unwrap();
    assert_eq!(&out.as_bytes()[..4], &[7, 6, 2, 3]);
    assert_eq!(out.as_bytes()[0x10], 0);

    assert_eq!(rom.as_bytes()[0], 0);
    let redecoded = schema.decode(&mut out.clone()).unwrap();
    assert_eq!(redecoded, edited);
}

#[test]
fn test_cycles_are_rejected() {
    let mut schema = Schema::new();
    schema.insert("a", |r: &mut Resolver<'_>| {
        r.fetch("b", State::Raw)?;
        Ok(Section::new(node(UInt::default()), Representation::Json))
    });
    schema.insert("b", |r: &mut Resolver<'_>| {
        r.fetch("a", State::Raw)?;
        Ok(Section::new(node(UInt::default()), Representation::Json))
    });

    let err = schema.decode(&mut image()).unwrap_err();
    assert_eq!(err.path(), vec!["a", "b"]);
    assert!(matches!(err.root(), CodecError::Definition(_)));
}

#[test]
fn test_format_needs_a_resolved_schema() {
    let schema = schema();
    assert!(matches!(
        schema.format(&Fields::new()),
        Err(CodecError::Validation(_))
    ));
}

#[test]
fn test_section_errors_are_named() {
    let mut schema = schema();
    let data = schema.decode(&mut image()).unwrap();
    let mut texts = schema.format(&data).unwrap();
    texts.insert("items".into(), "name\nAZ\nCD".into());

    let err = schema.parse(&texts).unwrap_err();
    assert_eq!(err.path()[0], "shop");
    assert!(err.to_string().contains("items::List(0)::name::"));
}

/// Doubles its value and reads the optimized value of another section.
#[derive(Debug)]
struct Doubler(Option<&'static str>);

impl Codec for Doubler {
    fn decode(&self, rom: &mut Rom, _pass: &mut Pass) -> Result<Value> {
        Ok(rom.read(Width::Byte)?.into())
    }

    fn encode(&self, value: &Value, rom: &mut Rom, _pass: &mut Pass) -> Result<()> {
        rom.write(value.as_u32()?, Width::Byte)
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        Ok(external.clone())
    }

    fn format(&self, value: &Value) -> Result<Value> {
        Ok(value.clone())
    }

    fn optimize(&self, value: &Value, optimizer: &mut Optimizer<'_>) -> Result<Value> {
        let extra = match self.0 {
            Some(other) => optimizer.fetch(other)?.as_int()?,
            None => 0,
        };
        Ok(Value::Int(value.as_int()? * 2 + extra))
    }
}

#[test]
fn test_optimize_sees_optimized_sections() {
    let mut schema = Schema::new();
    schema.insert_node("first", node(Doubler(Some("second"))), Representation::Json);
    schema.insert_node("second", node(Doubler(None)), Representation::Json);

    let mut rom = Rom::new(vec![5, 0, 0, 0], AddressMode::HiRom);
    let data = schema.decode(&mut rom).unwrap();
    // Both sections read from the same cursor in order: first=5, second=0.
    assert_eq!(data["first"], Value::Int(5));

    let data = map! { "first" => 5i64, "second" => 3i64 };
    let optimized = schema.optimize(data.as_map().unwrap()).unwrap();
    assert_eq!(optimized["second"], Value::Int(6));
    assert_eq!(optimized["first"], Value::Int(16));
}
