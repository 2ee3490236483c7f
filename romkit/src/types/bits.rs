//! Bit-packed records
//!
//! A [`Bits`] node reads one scalar and splits it by mask. Masks may be
//! scattered; a field's value is its masked bits shifted down by the mask's
//! trailing zero count, so mask `0xF0` holding `0xA0` reads as `0xA`.

use crate::error::{Annotate, CodecError, Result};
use crate::pass::Pass;
use crate::rom::{Rom, Width};
use crate::types::scalar::{format_radix, parse_radix};
use crate::types::{Codec, TypeRef};
use crate::value::{Fields, NULL, Value};

/// One slot of a [`Bits`] record.
#[derive(Debug, Clone)]
pub struct BitField {
    pub name: String,
    pub mask: u32,
    /// Formats/parses the slot (e.g. an enum); decimal text when absent
    pub ty: Option<TypeRef>,
}

impl BitField {
    pub fn new(name: impl Into<String>, mask: u32) -> Self {
        Self {
            name: name.into(),
            mask,
            ty: None,
        }
    }

    pub fn typed(mut self, ty: TypeRef) -> Self {
        self.ty = Some(ty);
        self
    }

    fn extract(&self, scalar: u32) -> u32 {
        (scalar & self.mask) >> self.mask.trailing_zeros()
    }

    fn place(&self, value: u32) -> Result<u32> {
        let shifted = value
            .checked_shl(self.mask.trailing_zeros())
            .filter(|s| s >> self.mask.trailing_zeros() == value)
            .unwrap_or(u32::MAX);
        if shifted & !self.mask != 0 {
            return Err(CodecError::RangeExceeded(format!(
                "{value:#x} does not fit mask {:#x}",
                self.mask
            )));
        }
        Ok(shifted)
    }
}

/// Record packed into a single scalar.
#[derive(Debug, Clone)]
pub struct Bits {
    pub fields: Vec<BitField>,
    pub width: Width,
}

impl Bits {
    pub fn new(fields: Vec<BitField>) -> Result<Self> {
        let mut claimed = 0u32;
        for (i, field) in fields.iter().enumerate() {
            if field.mask == 0 {
                return Err(CodecError::Definition(format!(
                    "bit field {:?} has an empty mask",
                    field.name
                )));
            }
            if claimed & field.mask != 0 {
                return Err(CodecError::Definition(format!(
                    "bit field {:?} overlaps an earlier mask ({:#x})",
                    field.name,
                    claimed & field.mask
                )));
            }
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(CodecError::Definition(format!(
                    "duplicate bit field {:?}",
                    field.name
                )));
            }
            claimed |= field.mask;
        }

        Ok(Self {
            width: Width::fitting(claimed),
            fields,
        })
    }

    fn unpack(&self, scalar: u32) -> Result<Fields> {
        let mut residue = scalar;
        let mut data = Fields::new();
        for field in &self.fields {
            residue &= !field.mask;
            data.insert(field.name.clone(), field.extract(scalar).into());
        }
        if residue != 0 {
            return Err(CodecError::UnhandledBits(residue));
        }
        Ok(data)
    }

    fn pack(&self, data: &Fields) -> Result<u32> {
        let mut scalar = 0;
        for field in &self.fields {
            let value = data
                .get(&field.name)
                .unwrap_or(&NULL)
                .as_u32()
                .within(&field.name)?;
            scalar |= field.place(value).within(&field.name)?;
        }
        Ok(scalar)
    }
}

impl Codec for Bits {
    fn decode(&self, rom: &mut Rom, _pass: &mut Pass) -> Result<Value> {
        let scalar = rom.read(self.width)?;
        Ok(Value::Map(self.unpack(scalar)?))
    }

    fn encode(&self, value: &Value, rom: &mut Rom, _pass: &mut Pass) -> Result<()> {
        let scalar = self.pack(value.as_map()?)?;
        rom.write(scalar, self.width)
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        let json = external.as_map()?;
        let mut data = Fields::new();
        for field in &self.fields {
            let item = json.get(&field.name).unwrap_or(&NULL);
            let raw = match &field.ty {
                Some(ty) => ty.parse(item),
                None => parse_radix(item, 10).map(Value::from),
            }
            .within(&field.name)?;
            field.place(raw.as_u32()?).within(&field.name)?;
            data.insert(field.name.clone(), raw);
        }
        Ok(Value::Map(data))
    }

    fn format(&self, value: &Value) -> Result<Value> {
        let data = value.as_map()?;
        let mut json = Fields::new();
        for field in &self.fields {
            let raw = data.get(&field.name).unwrap_or(&NULL);
            let item = match &field.ty {
                Some(ty) => ty.format(raw),
                None => raw.as_u32().map(|v| Value::Text(format_radix(v, 10))),
            }
            .within(&field.name)?;
            json.insert(field.name.clone(), item);
        }
        Ok(Value::Map(json))
    }

    fn child(&self, name: &str) -> Option<TypeRef> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .and_then(|f| f.ty.clone())
    }
}

/// Set of single-bit flags shown as the list of set flag names.
#[derive(Debug, Clone)]
pub struct Bitmask {
    pub bits: Bits,
    /// Label shown when no flag is set
    pub off: Option<String>,
}

impl Bitmask {
    pub fn new<S: Into<String>>(flags: Vec<(u32, S)>, off: Option<String>) -> Result<Self> {
        let fields: Vec<BitField> = flags
            .into_iter()
            .map(|(mask, name)| BitField::new(name, mask))
            .collect();

        for field in &fields {
            if !field.mask.is_power_of_two() {
                return Err(CodecError::Definition(format!(
                    "flag {:?} must be a single bit, found mask {:#x}",
                    field.name, field.mask
                )));
            }
            if off.as_deref() == Some(field.name.as_str()) {
                return Err(CodecError::Definition(format!(
                    "off state {:?} matches a flag name",
                    field.name
                )));
            }
        }

        Ok(Self {
            bits: Bits::new(fields)?,
            off,
        })
    }
}

impl Codec for Bitmask {
    fn decode(&self, rom: &mut Rom, pass: &mut Pass) -> Result<Value> {
        self.bits.decode(rom, pass)
    }

    fn encode(&self, value: &Value, rom: &mut Rom, pass: &mut Pass) -> Result<()> {
        self.bits.encode(value, rom, pass)
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        let names = external
            .as_list()?
            .iter()
            .map(Value::as_text)
            .collect::<Result<Vec<_>>>()?;

        let mut data: Fields = self
            .bits
            .fields
            .iter()
            .map(|f| (f.name.clone(), Value::Int(0)))
            .collect();

        if names.first().copied() == self.off.as_deref() && !names.is_empty() {
            return Ok(Value::Map(data));
        }
        for name in names {
            match data.get_mut(name) {
                Some(slot) => *slot = Value::Int(1),
                None => return Err(CodecError::LookupMissing(format!("flag: {name:?}"))),
            }
        }
        Ok(Value::Map(data))
    }

    fn format(&self, value: &Value) -> Result<Value> {
        let data = value.as_map()?;
        let mut set = Vec::new();
        for field in &self.bits.fields {
            if data.get(&field.name).unwrap_or(&NULL).as_int().within(&field.name)? != 0 {
                set.push(Value::Text(field.name.clone()));
            }
        }
        match (&self.off, set.is_empty()) {
            (Some(off), true) => Ok(Value::List(vec![Value::Text(off.clone())])),
            _ => Ok(Value::List(set)),
        }
    }
}
