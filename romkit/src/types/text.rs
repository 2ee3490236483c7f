//! Character tables and text
//!
//! Text is stored as one byte per table entry. A table label may be longer
//! than one character (`{hero}`, `<A>`); bytes with no label are written as
//! `[0x..]` escapes so any byte string survives the round trip.

use std::sync::Arc;

use crate::error::{Annotate, CodecError, Result};
use crate::lookup::Lookup;
use crate::pass::Pass;
use crate::rom::{Rom, Width};
use crate::types::fork::{Fork, ForkOption};
use crate::types::list::item_name;
use crate::types::scalar::format_radix;
use crate::types::{Codec, TypeRef, node};
use crate::value::{Fields, Value};

/// Name of the option that ends a [`TextScript`].
pub const SCRIPT_END: &str = "end";

/// Name of the option that carries plain characters in a [`TextScript`].
pub const SCRIPT_CHAR: &str = "default";

/// One byte translated through a character table.
#[derive(Debug, Clone)]
pub struct Char {
    pub table: Arc<Lookup>,
}

impl Char {
    pub fn new(table: Arc<Lookup>) -> Self {
        Self { table }
    }

    fn label(&self, byte: u32) -> String {
        if self.table.has_value(byte) {
            self.table.label(byte).map(str::to_string).unwrap_or_default()
        } else {
            format!("[{}]", format_radix(byte, 16))
        }
    }

    fn byte(&self, token: &str) -> Result<u32> {
        if self.table.has_label(token) {
            return self.table.value(token);
        }
        match escaped_byte(token) {
            Some(byte) => Ok(byte),
            None => self.table.value(token),
        }
    }

    /// Longest table label or `[0x..]` escape at the start of `text`.
    fn next_token<'t>(&self, text: &'t str) -> Option<&'t str> {
        let label = self
            .table
            .iter()
            .map(|(_, label)| label)
            .filter(|label| !label.is_empty() && text.starts_with(label))
            .map(str::len)
            .max();
        let escape = text
            .strip_prefix("[0x")
            .and_then(|t| t.find(']'))
            .map(|end| end + 4)
            .filter(|&len| escaped_byte(&text[..len]).is_some());
        let len = match (label, escape) {
            (Some(label), Some(escape)) => label.max(escape),
            (label, escape) => label.or(escape)?,
        };
        Some(&text[..len])
    }

    /// Read `text` back into bytes, taking the longest token at each step.
    fn read_bytes(&self, text: &str) -> Result<Vec<u32>> {
        let mut bytes = Vec::new();
        let mut rest = text;
        while let Some(c) = rest.chars().next() {
            let token = match self.next_token(rest) {
                Some(token) => token,
                None if c == '[' && !rest.contains(']') => {
                    return Err(CodecError::ParseFormat(format!("unclosed escape in {text:?}")));
                }
                None => &rest[..c.len_utf8()],
            };
            bytes.push(self.byte(token)?);
            rest = &rest[token.len()..];
        }
        Ok(bytes)
    }
}

fn escaped_byte(token: &str) -> Option<u32> {
    token
        .strip_prefix("[0x")
        .and_then(|t| t.strip_suffix(']'))
        .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        .map(u32::from)
}

impl Codec for Char {
    fn decode(&self, rom: &mut Rom, _pass: &mut Pass) -> Result<Value> {
        Ok(rom.read(Width::Byte)?.into())
    }

    fn encode(&self, value: &Value, rom: &mut Rom, _pass: &mut Pass) -> Result<()> {
        rom.write(value.as_u32()?, Width::Byte)
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        Ok(self.byte(external.as_text()?)?.into())
    }

    fn format(&self, value: &Value) -> Result<Value> {
        Ok(Value::Text(self.label(value.as_u32()?)))
    }
}

/// How a [`Text`] ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextLength {
    /// Exactly this many bytes
    Fixed(usize),
    /// Runs up to and including this byte
    Terminated(u8),
}

/// A run of [`Char`]s shown as one string.
#[derive(Debug, Clone)]
pub struct Text {
    pub length: TextLength,
    pub ch: Char,
    /// Padding for fixed text, stripped from the external form
    pub pad: Option<u8>,
}

impl Text {
    pub fn fixed(length: usize, table: Arc<Lookup>, pad: Option<u8>) -> Self {
        Self {
            length: TextLength::Fixed(length),
            ch: Char::new(table),
            pad,
        }
    }

    pub fn terminated(terminator: u8, table: Arc<Lookup>) -> Self {
        Self {
            length: TextLength::Terminated(terminator),
            ch: Char::new(table),
            pad: None,
        }
    }

    fn bytes(value: &Value) -> Result<Vec<u32>> {
        value.as_list()?.iter().map(Value::as_u32).collect()
    }
}

impl Codec for Text {
    fn decode(&self, rom: &mut Rom, _pass: &mut Pass) -> Result<Value> {
        let mut bytes = Vec::new();
        match self.length {
            TextLength::Fixed(n) => {
                for _ in 0..n {
                    bytes.push(Value::from(rom.read(Width::Byte)?));
                }
            }
            TextLength::Terminated(end) => loop {
                let byte = rom.read(Width::Byte)?;
                bytes.push(Value::from(byte));
                if byte == u32::from(end) {
                    break;
                }
            },
        }
        Ok(Value::List(bytes))
    }

    fn encode(&self, value: &Value, rom: &mut Rom, _pass: &mut Pass) -> Result<()> {
        let bytes = Self::bytes(value)?;
        match self.length {
            TextLength::Fixed(n) if bytes.len() != n => {
                return Err(CodecError::Validation(format!(
                    "expected {n} bytes of text, found {}",
                    bytes.len()
                )));
            }
            TextLength::Terminated(end) => {
                let first = bytes.iter().position(|&b| b == u32::from(end));
                if first.map(|i| i + 1) != Some(bytes.len()) {
                    return Err(CodecError::Validation(format!(
                        "text must end with {end:#04x} and contain it only once"
                    )));
                }
            }
            _ => {}
        }
        for byte in bytes {
            rom.write(byte, Width::Byte)?;
        }
        Ok(())
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        let text = external.as_text()?;
        let mut bytes = self.ch.read_bytes(text)?;

        match self.length {
            TextLength::Fixed(n) => {
                if bytes.len() > n {
                    return Err(CodecError::RangeExceeded(format!(
                        "{text:?} is longer than {n} bytes"
                    )));
                }
                match self.pad {
                    Some(pad) => bytes.resize(n, pad.into()),
                    None if bytes.len() < n => {
                        return Err(CodecError::Validation(format!(
                            "{text:?} is shorter than {n} bytes"
                        )));
                    }
                    None => {}
                }
            }
            TextLength::Terminated(end) => {
                if bytes.contains(&u32::from(end)) {
                    return Err(CodecError::Validation(format!(
                        "{text:?} contains the terminator {end:#04x}"
                    )));
                }
                bytes.push(end.into());
            }
        }
        Ok(Value::List(bytes.into_iter().map(Value::from).collect()))
    }

    fn format(&self, value: &Value) -> Result<Value> {
        let mut bytes = Self::bytes(value)?;
        match (self.length, self.pad) {
            (TextLength::Terminated(_), _) => {
                bytes.pop();
            }
            (TextLength::Fixed(_), Some(pad)) => {
                while bytes.last() == Some(&u32::from(pad)) {
                    bytes.pop();
                }
            }
            (TextLength::Fixed(_), None) => {}
        }
        let text: String = bytes.iter().map(|&b| self.ch.label(b)).collect();
        if self.ch.read_bytes(&text).ok().as_ref() != Some(&bytes) {
            return Err(CodecError::Validation(format!(
                "{text:?} reads back as different bytes with this character table"
            )));
        }
        Ok(Value::Text(text))
    }
}

/// Script text: characters interleaved with opcodes.
///
/// Each item is a one-byte [`Fork`]. Bytes with no opcode go through the
/// character table under the [`SCRIPT_CHAR`] option. The external form is a
/// single string where commands appear as `[name]` or `[name:data]`; the
/// script ends at the first [`SCRIPT_END`] command.
#[derive(Debug, Clone)]
pub struct TextScript {
    pub fork: Fork,
    pub ch: Char,
}

impl TextScript {
    pub fn new(table: Arc<Lookup>, commands: Vec<ForkOption>) -> Result<Self> {
        if !commands.iter().any(|c| c.name == SCRIPT_END) {
            return Err(CodecError::Definition(format!(
                "text script needs an {SCRIPT_END:?} command"
            )));
        }
        let ch = Char::new(table);
        let mut options = vec![ForkOption::default(SCRIPT_CHAR, node(ch.clone()))];
        options.extend(commands);
        Ok(Self {
            fork: Fork::new(Width::Byte, options)?,
            ch,
        })
    }

    fn has_command(&self, name: &str) -> bool {
        name != SCRIPT_CHAR && self.fork.options.iter().any(|o| o.name == name)
    }

    fn name(item: &Value) -> Result<&str> {
        item.field("name")?.as_text()
    }

    /// Break script text into `{name, data}` items.
    fn tokenize(&self, text: &str) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut rest = text;
        while let Some(c) = rest.chars().next() {
            let body = rest
                .strip_prefix('[')
                .and_then(|t| t.find(']').map(|end| &t[..end]));
            let command = body.map(|body| body.split_once(':').unwrap_or((body, "")));
            let (item, len) = match (command, self.ch.next_token(rest)) {
                (Some((name, data)), _) if self.has_command(name) => {
                    let data = if data.is_empty() {
                        Value::Null
                    } else {
                        Value::text(data)
                    };
                    (tagged(name, data), body.map_or(0, str::len) + 2)
                }
                (_, Some(token)) => (tagged(SCRIPT_CHAR, Value::text(token)), token.len()),
                (Some((name, _)), None) => return Err(self.fork_missing(name)),
                (None, None) => {
                    let token = &rest[..c.len_utf8()];
                    (tagged(SCRIPT_CHAR, Value::text(token)), token.len())
                }
            };
            rest = &rest[len..];
            items.push(item);
        }
        Ok(items)
    }

    fn fork_missing(&self, name: &str) -> CodecError {
        CodecError::SchemaMissingOption {
            key: name.to_string(),
            options: self.fork.options.iter().map(|o| o.name.clone()).collect(),
        }
    }
}

fn tagged(name: &str, data: Value) -> Value {
    let mut fields = Fields::new();
    fields.insert("name".into(), Value::text(name));
    fields.insert("data".into(), data);
    Value::Map(fields)
}

impl Codec for TextScript {
    fn decode(&self, rom: &mut Rom, pass: &mut Pass) -> Result<Value> {
        let mut items = Vec::new();
        loop {
            let item = self.fork.decode(rom, pass).within_with(|| item_name(items.len()))?;
            let end = Self::name(&item)? == SCRIPT_END;
            items.push(item);
            if end {
                return Ok(Value::List(items));
            }
        }
    }

    fn encode(&self, value: &Value, rom: &mut Rom, pass: &mut Pass) -> Result<()> {
        let items = value.as_list()?;
        match items.last() {
            Some(last) if Self::name(last)? == SCRIPT_END => {}
            _ => {
                return Err(CodecError::Validation(format!(
                    "script must end with [{SCRIPT_END}]"
                )));
            }
        }
        for (i, item) in items.iter().enumerate() {
            self.fork.encode(item, rom, pass).within_with(|| item_name(i))?;
        }
        Ok(())
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        self.tokenize(external.as_text()?)?
            .iter()
            .enumerate()
            .map(|(i, item)| self.fork.parse(item).within_with(|| item_name(i)))
            .collect::<Result<Vec<_>>>()
            .map(Value::List)
    }

    fn format(&self, value: &Value) -> Result<Value> {
        let mut text = String::new();
        for (i, item) in value.as_list()?.iter().enumerate() {
            let formatted = self.fork.format(item).within_with(|| item_name(i))?;
            let name = Self::name(&formatted)?;
            let data = match formatted.field("data")? {
                Value::Null => None,
                Value::Text(data) => Some(data.clone()),
                Value::Int(data) => Some(data.to_string()),
                other => {
                    let err = CodecError::Validation(format!(
                        "command {name:?} formats to a {}, expected text",
                        other.kind()
                    ));
                    return Err(err.within(item_name(i)));
                }
            };
            match (name, data) {
                (SCRIPT_CHAR, Some(data)) => text.push_str(&data),
                (name, None) => {
                    text.push('[');
                    text.push_str(name);
                    text.push(']');
                }
                (name, Some(data)) => {
                    text.push('[');
                    text.push_str(name);
                    text.push(':');
                    text.push_str(&data);
                    text.push(']');
                }
            }
        }
        Ok(Value::Text(text))
    }

    fn child(&self, name: &str) -> Option<TypeRef> {
        self.fork.child(name)
    }
}
