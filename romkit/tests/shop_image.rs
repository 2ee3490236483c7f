//! Small HiROM image with an item table, shared descriptions and a shop.
//!
//! Layout:
//! - 0xC01000 item pointer table (3 entries), payloads from 0xC01100
//! - 0xC02000 description pointer table (3 entries, two equal), payloads
//!   from 0xC02100
//! - 0xC03000 shop stock: two item indices

#![allow(dead_code)]

use std::sync::Arc;

use romkit::types::{EnumFrom, Field, List, ListSize, PointerTable, Reader, Struct, Text, UInt};
use romkit::{AddressMode, Lookup, Representation, Resolver, Rom, Schema, Section, Width, node};

pub const ITEMS_END: u32 = 0xC01200;
pub const DESCRIPTIONS_END: u32 = 0xC02180;

fn put(bytes: &mut [u8], address: u32, data: &[u8]) {
    let at = (address - 0xC00000) as usize;
    bytes[at..at + data.len()].copy_from_slice(data);
}

/// Upper-case letters at their ASCII codes, plus space.
pub fn font() -> Arc<Lookup> {
    let letters = (b'A'..=b'Z').map(|b| (u32::from(b), char::from(b).to_string()));
    let entries = letters.chain([(0x20, " ".to_string())]);
    Arc::new(Lookup::new(entries).unwrap())
}

pub fn image() -> Rom {
    let mut bytes = vec![0u8; 0x10000];

    put(&mut bytes, 0xC01000, &[0x00, 0x11, 0x09, 0x11, 0x11, 0x11]);
    put(&mut bytes, 0xC01100, b"POTION\0\x32\x00");
    put(&mut bytes, 0xC01109, b"ETHER\0\x96\x00");
    put(&mut bytes, 0xC01111, b"ELIXIR\0\xE7\x03");
    put(&mut bytes, 0xC0111A, &[0xFF; 0xE6]);

    put(&mut bytes, 0xC02000, &[0x00, 0x21, 0x06, 0x21, 0x00, 0x21]);
    put(&mut bytes, 0xC02100, b"HEALS\0");
    put(&mut bytes, 0xC02106, b"RESTORES\0");
    put(&mut bytes, 0xC0210F, &[0xFF; 0x71]);

    put(&mut bytes, 0xC03000, &[2, 0]);
    Rom::new(bytes, AddressMode::HiRom)
}

pub fn items_table() -> PointerTable {
    let record = Struct::new(vec![
        Field::new("name", node(Text::terminated(0, font()))),
        Field::new("price", node(UInt::decimal(Width::Word))),
    ])
    .unwrap();
    PointerTable::new(node(record), 0xC00000)
        .sized(ListSize::Fixed(3))
        .with_start(0xC01100)
        .with_warn(ITEMS_END)
}

pub fn schema() -> Schema {
    let mut schema = Schema::new();
    schema.insert_node(
        "items",
        node(Reader::new(0xC01000, node(items_table()))),
        Representation::Tabular,
    );

    let descriptions = PointerTable::new(node(Text::terminated(0, font())), 0xC00000)
        .sized(ListSize::Fixed(3))
        .with_start(0xC02100)
        .with_warn(DESCRIPTIONS_END);
    schema.insert_node(
        "descriptions",
        node(Reader::new(0xC02000, node(descriptions))),
        Representation::Yaml,
    );

    schema.insert("shop", |resolver: &mut Resolver<'_>| {
        let stock = EnumFrom::new("items", &["name"]).build(resolver)?;
        let stock = List::new(node(stock), ListSize::Fixed(2));
        Ok(Section::new(
            node(Reader::new(0xC03000, node(stock))),
            Representation::Json,
        ))
    });
    schema
}
