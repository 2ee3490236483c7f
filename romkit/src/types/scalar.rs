//! Scalar, constant and enumerated nodes

use std::sync::Arc;

use crate::error::{CodecError, Result};
use crate::lookup::Lookup;
use crate::pass::Pass;
use crate::rom::{Rom, Width};
use crate::types::Codec;
use crate::value::Value;

/// Render an integer in `radix` with its conventional prefix.
pub(crate) fn format_radix(value: u32, radix: u32) -> String {
    match radix {
        2 => format!("0b{value:b}"),
        8 => format!("0o{value:o}"),
        16 => format!("0x{value:x}"),
        _ => value.to_string(),
    }
}

/// Parse an external integer: text in `radix` (prefix optional) or a number.
pub(crate) fn parse_radix(external: &Value, radix: u32) -> Result<u32> {
    let text = match external {
        Value::Int(v) => {
            return u32::try_from(*v)
                .map_err(|_| CodecError::ParseFormat(format!("{v} is not an unsigned scalar")));
        }
        Value::Text(text) => text.trim(),
        other => {
            return Err(CodecError::ParseFormat(format!(
                "expected a number, found {}",
                other.kind()
            )));
        }
    };

    let prefix = match radix {
        2 => "0b",
        8 => "0o",
        16 => "0x",
        _ => "",
    };
    let digits = if prefix.is_empty() {
        text
    } else {
        text.strip_prefix(prefix)
            .or_else(|| text.strip_prefix(&prefix.to_uppercase()))
            .unwrap_or(text)
    };
    u32::from_str_radix(digits, radix)
        .map_err(|e| CodecError::ParseFormat(format!("invalid base-{radix} number {text:?}: {e}")))
}

fn check_width(value: u32, width: Width) -> Result<u32> {
    if value > width.max() {
        return Err(CodecError::RangeExceeded(format!(
            "{value:#x} does not fit in {} byte(s)",
            width.bytes()
        )));
    }
    Ok(value)
}

/// Unsigned integer rendered in a fixed radix.
#[derive(Debug, Clone, Copy)]
pub struct UInt {
    pub width: Width,
    pub radix: u32,
}

impl UInt {
    pub fn new(width: Width, radix: u32) -> Self {
        Self { width, radix }
    }

    pub fn hex(width: Width) -> Self {
        Self::new(width, 16)
    }

    pub fn decimal(width: Width) -> Self {
        Self::new(width, 10)
    }
}

impl Default for UInt {
    fn default() -> Self {
        Self::hex(Width::Byte)
    }
}

impl Codec for UInt {
    fn decode(&self, rom: &mut Rom, _pass: &mut Pass) -> Result<Value> {
        Ok(rom.read(self.width)?.into())
    }

    fn encode(&self, value: &Value, rom: &mut Rom, _pass: &mut Pass) -> Result<()> {
        rom.write(value.as_u32()?, self.width)
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        Ok(check_width(parse_radix(external, self.radix)?, self.width)?.into())
    }

    fn format(&self, value: &Value) -> Result<Value> {
        Ok(Value::Text(format_radix(value.as_u32()?, self.radix)))
    }
}

/// Constant value, typically a signature or padding byte.
///
/// The external form is always the constant in hex, whatever is stored.
#[derive(Debug, Clone, Copy)]
pub struct Fixed {
    pub value: u32,
    pub width: Width,
}

impl Fixed {
    pub fn new(value: u32, width: Width) -> Self {
        Self { value, width }
    }

    pub fn byte(value: u32) -> Self {
        Self::new(value, Width::Byte)
    }

    fn validate(&self, found: u32) -> Result<u32> {
        if found != self.value {
            return Err(CodecError::Validation(format!(
                "fixed value expected {:#x}, found {found:#x}",
                self.value
            )));
        }
        Ok(found)
    }
}

impl Codec for Fixed {
    fn decode(&self, rom: &mut Rom, _pass: &mut Pass) -> Result<Value> {
        Ok(self.validate(rom.read(self.width)?)?.into())
    }

    fn encode(&self, value: &Value, rom: &mut Rom, _pass: &mut Pass) -> Result<()> {
        rom.write(self.validate(value.as_u32()?)?, self.width)
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        Ok(self.validate(parse_radix(external, 16)?)?.into())
    }

    fn format(&self, _value: &Value) -> Result<Value> {
        Ok(Value::Text(format_radix(self.value, 16)))
    }
}

/// Scalar translated through a [`Lookup`].
#[derive(Debug, Clone)]
pub struct Enum {
    pub width: Width,
    pub lookup: Arc<Lookup>,
}

impl Enum {
    pub fn new(width: Width, lookup: Lookup) -> Self {
        Self {
            width,
            lookup: Arc::new(lookup),
        }
    }

    /// Enum over a table shared with other nodes.
    pub fn shared(width: Width, lookup: Arc<Lookup>) -> Self {
        Self { width, lookup }
    }

    /// One-byte enum.
    pub fn byte(lookup: Lookup) -> Self {
        Self::new(Width::Byte, lookup)
    }

    /// Two-byte enum.
    pub fn word(lookup: Lookup) -> Self {
        Self::new(Width::Word, lookup)
    }

    /// `0 = false`, `1 = true`.
    pub fn boolean() -> Self {
        Self::byte(Lookup::boolean())
    }

    fn checked(&self, raw: u32) -> Result<u32> {
        if self.lookup.is_strict() {
            self.lookup.label(raw)?;
        }
        Ok(raw)
    }
}

impl Codec for Enum {
    fn decode(&self, rom: &mut Rom, _pass: &mut Pass) -> Result<Value> {
        Ok(self.checked(rom.read(self.width)?)?.into())
    }

    fn encode(&self, value: &Value, rom: &mut Rom, _pass: &mut Pass) -> Result<()> {
        rom.write(self.checked(value.as_u32()?)?, self.width)
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        let raw = self.lookup.value(external.as_text()?)?;
        Ok(check_width(raw, self.width)?.into())
    }

    fn format(&self, value: &Value) -> Result<Value> {
        Ok(self.lookup.label(value.as_u32()?)?.into())
    }
}

/// Consumes nothing and has no value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Empty;

impl Codec for Empty {
    fn decode(&self, _rom: &mut Rom, _pass: &mut Pass) -> Result<Value> {
        Ok(Value::Null)
    }

    fn encode(&self, _value: &Value, _rom: &mut Rom, _pass: &mut Pass) -> Result<()> {
        Ok(())
    }

    fn parse(&self, _external: &Value) -> Result<Value> {
        Ok(Value::Null)
    }

    fn format(&self, _value: &Value) -> Result<Value> {
        Ok(Value::Null)
    }
}

/// [`Empty`] that renders a fixed label in the external form.
#[derive(Debug, Clone)]
pub struct Placeholder {
    pub text: String,
}

impl Placeholder {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Codec for Placeholder {
    fn decode(&self, _rom: &mut Rom, _pass: &mut Pass) -> Result<Value> {
        Ok(Value::Null)
    }

    fn encode(&self, _value: &Value, _rom: &mut Rom, _pass: &mut Pass) -> Result<()> {
        Ok(())
    }

    fn parse(&self, _external: &Value) -> Result<Value> {
        Ok(Value::Null)
    }

    fn format(&self, _value: &Value) -> Result<Value> {
        Ok(Value::Text(self.text.clone()))
    }
}
