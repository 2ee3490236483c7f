//! Pointer indirection and placed readers

use crate::error::{Annotate, CodecError, Result};
use crate::pass::{NodeId, Pass};
use crate::rom::{Rom, Width};
use crate::schema::Optimizer;
use crate::types::{Codec, TypeRef};
use crate::value::{Fields, NULL, Value};

fn check_warn(rom: &Rom, warn: Option<u32>) -> Result<u32> {
    let end = rom.offset()?;
    match warn {
        Some(limit) if end > limit => Err(CodecError::RangeExceeded(format!(
            "data ends at {end:#08X}, past the limit {limit:#08X}"
        ))),
        _ => Ok(end),
    }
}

/// Stored pointer value for a payload at `address`.
pub(crate) fn pointer_value(address: u32, shift: u32, width: Width) -> Result<u32> {
    address
        .checked_sub(shift)
        .filter(|v| *v <= width.max())
        .ok_or_else(|| {
            CodecError::RangeExceeded(format!(
                "{address:#08X} is not reachable from {shift:#08X} with a {}-byte pointer",
                width.bytes()
            ))
        })
}

/// Payload reached through a pointer at the cursor.
///
/// Encoding writes each distinct payload once, at an allocation cursor that
/// starts at `base` and is shared by every use of this node in the pass.
#[derive(Debug, Clone)]
pub struct Pointer {
    id: NodeId,
    pub ty: TypeRef,
    pub width: Width,
    /// Added to the stored value to form the address
    pub shift: u32,
    /// First address handed out on encode
    pub base: u32,
    /// Highest address payloads may reach
    pub warn: Option<u32>,
}

impl Pointer {
    pub fn new(ty: TypeRef, width: Width, shift: u32, base: u32) -> Self {
        Self {
            id: NodeId::next(),
            ty,
            width,
            shift,
            base,
            warn: None,
        }
    }

    pub fn with_warn(mut self, warn: u32) -> Self {
        self.warn = Some(warn);
        self
    }
}

impl Codec for Pointer {
    fn decode(&self, rom: &mut Rom, pass: &mut Pass) -> Result<Value> {
        let address = rom.read(self.width)?.saturating_add(self.shift);
        rom.enter(address, |rom| self.ty.decode(rom, pass))
    }

    fn encode(&self, value: &Value, rom: &mut Rom, pass: &mut Pass) -> Result<()> {
        let identity = value.identity();
        let allocation = pass.allocation(self.id, self.base);
        let address = match allocation.placed(&identity) {
            Some(address) => address,
            None => {
                let address = allocation.cursor;
                let end = rom.enter(address, |rom| {
                    self.ty.encode(value, rom, pass)?;
                    check_warn(rom, self.warn)
                })?;
                pass.allocation(self.id, self.base).place(identity, address, end);
                address
            }
        };
        rom.write(pointer_value(address, self.shift, self.width)?, self.width)
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        self.ty.parse(external)
    }

    fn format(&self, value: &Value) -> Result<Value> {
        self.ty.format(value)
    }

    fn optimize(&self, value: &Value, optimizer: &mut Optimizer<'_>) -> Result<Value> {
        self.ty.optimize(value, optimizer)
    }

    fn inner(&self) -> Option<TypeRef> {
        Some(self.ty.clone())
    }
}

/// Value at a fixed address, whatever the cursor.
#[derive(Debug, Clone)]
pub struct Reader {
    pub offset: u32,
    pub warn: Option<u32>,
    pub ty: TypeRef,
}

impl Reader {
    pub fn new(offset: u32, ty: TypeRef) -> Self {
        Self {
            offset,
            warn: None,
            ty,
        }
    }

    pub fn with_warn(mut self, warn: u32) -> Self {
        self.warn = Some(warn);
        self
    }
}

impl Codec for Reader {
    fn decode(&self, rom: &mut Rom, pass: &mut Pass) -> Result<Value> {
        rom.enter(self.offset, |rom| {
            let value = self.ty.decode(rom, pass)?;
            check_warn(rom, self.warn)?;
            Ok(value)
        })
    }

    fn encode(&self, value: &Value, rom: &mut Rom, pass: &mut Pass) -> Result<()> {
        rom.enter(self.offset, |rom| {
            self.ty.encode(value, rom, pass)?;
            check_warn(rom, self.warn).map(drop)
        })
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        self.ty.parse(external)
    }

    fn format(&self, value: &Value) -> Result<Value> {
        self.ty.format(value)
    }

    fn optimize(&self, value: &Value, optimizer: &mut Optimizer<'_>) -> Result<Value> {
        self.ty.optimize(value, optimizer)
    }

    fn inner(&self) -> Option<TypeRef> {
        Some(self.ty.clone())
    }
}

/// Steps the cursor back before delegating.
#[derive(Debug, Clone)]
pub struct Rewind {
    pub steps: u32,
    pub ty: TypeRef,
}

impl Rewind {
    pub fn new(steps: u32, ty: TypeRef) -> Self {
        Self { steps, ty }
    }

    fn rewind(&self, rom: &mut Rom) -> Result<()> {
        let offset = rom.offset()?;
        let target = offset.checked_sub(self.steps).ok_or_else(|| {
            CodecError::Addressing(format!("cannot rewind {} bytes from {offset:#08X}", self.steps))
        })?;
        rom.seek(target)
    }
}

impl Codec for Rewind {
    fn decode(&self, rom: &mut Rom, pass: &mut Pass) -> Result<Value> {
        self.rewind(rom)?;
        self.ty.decode(rom, pass)
    }

    fn encode(&self, value: &Value, rom: &mut Rom, pass: &mut Pass) -> Result<()> {
        self.rewind(rom)?;
        self.ty.encode(value, rom, pass)
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        self.ty.parse(external)
    }

    fn format(&self, value: &Value) -> Result<Value> {
        self.ty.format(value)
    }

    fn optimize(&self, value: &Value, optimizer: &mut Optimizer<'_>) -> Result<Value> {
        self.ty.optimize(value, optimizer)
    }

    fn inner(&self) -> Option<TypeRef> {
        Some(self.ty.clone())
    }
}

/// Record whose fields are each reached through a pointer.
///
/// The pointers sit back to back at `offset`, one per field. Decoding leaves
/// the cursor alone; encoding writes the payloads in field order at the
/// cursor and points each slot at its payload.
#[derive(Debug, Clone)]
pub struct PointerStruct {
    pub offset: u32,
    pub width: Width,
    pub shift: u32,
    pub fields: Vec<(String, TypeRef)>,
}

impl PointerStruct {
    pub fn new(offset: u32, width: Width, shift: u32, fields: Vec<(String, TypeRef)>) -> Self {
        Self {
            offset,
            width,
            shift,
            fields,
        }
    }

    fn slot(&self, i: usize) -> u32 {
        self.offset + (i * self.width.bytes()) as u32
    }
}

impl Codec for PointerStruct {
    fn decode(&self, rom: &mut Rom, pass: &mut Pass) -> Result<Value> {
        let mut data = Fields::new();
        for (i, (name, ty)) in self.fields.iter().enumerate() {
            let value = rom
                .enter(self.slot(i), |rom| rom.read(self.width))
                .and_then(|pointer| {
                    rom.enter(pointer.saturating_add(self.shift), |rom| ty.decode(rom, pass))
                })
                .within(name)?;
            data.insert(name.clone(), value);
        }
        Ok(Value::Map(data))
    }

    fn encode(&self, value: &Value, rom: &mut Rom, pass: &mut Pass) -> Result<()> {
        let data = value.as_map()?;
        for (i, (name, ty)) in self.fields.iter().enumerate() {
            let pointer = pointer_value(rom.offset()?, self.shift, self.width).within(name)?;
            rom.enter(self.slot(i), |rom| rom.write(pointer, self.width))
                .within(name)?;
            ty.encode(data.get(name).unwrap_or(&NULL), rom, pass)
                .within(name)?;
        }
        Ok(())
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        let json = external.as_map()?;
        let mut data = Fields::new();
        for (name, ty) in &self.fields {
            let value = ty.parse(json.get(name).unwrap_or(&NULL)).within(name)?;
            data.insert(name.clone(), value);
        }
        Ok(Value::Map(data))
    }

    fn format(&self, value: &Value) -> Result<Value> {
        let data = value.as_map()?;
        let mut json = Fields::new();
        for (name, ty) in &self.fields {
            let value = ty.format(data.get(name).unwrap_or(&NULL)).within(name)?;
            json.insert(name.clone(), value);
        }
        Ok(Value::Map(json))
    }

    fn child(&self, name: &str) -> Option<TypeRef> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, ty)| ty.clone())
    }
}
