//! Deduplicating pointer tables and index tables
//!
//! A [`PointerTable`] is a run of pointers followed by the payloads they
//! point to. Equal payloads are written once and shared. Banked tables
//! (`wrap`) start with a 16-bit count: pointers past that index are relative
//! to the `wrap` address instead of `offset`.

use std::sync::Arc;

use hashbrown::HashMap;
use tracing::debug;

use crate::error::{Annotate, CodecError, Result};
use crate::pass::{NodeId, Pass};
use crate::rom::{Rom, Width};
use crate::schema::Optimizer;
use crate::types::list::ListSize;
use crate::types::pointer::pointer_value;
use crate::types::scalar::UInt;
use crate::types::{Codec, TypeRef};
use crate::value::Value;

/// Byte written over unused table space by default.
pub const DEFAULT_FILL: u8 = 0xFF;

fn entry_name(i: usize) -> String {
    format!("PointerTable({i})")
}

/// Encode-time allocation state of one table.
struct Layout {
    seen: HashMap<String, u32>,
    base: u32,
    /// Wrap address and count slot, until the crossover
    wrap: Option<(u32, u32)>,
    cursor: u32,
}

#[derive(Debug, Clone)]
pub struct PointerTable {
    pub ty: TypeRef,
    /// Number of entries
    pub size: Option<ListSize>,
    /// Base added to pointers before the wrap point
    pub offset: u32,
    pub width: Width,
    /// First payload address on encode
    pub start: u32,
    /// Base for pointers after the crossover
    pub wrap: Option<u32>,
    /// End of the payload area
    pub warn: Option<u32>,
    pub fill: u8,
}

impl PointerTable {
    pub fn new(ty: TypeRef, offset: u32) -> Self {
        Self {
            ty,
            size: None,
            offset,
            width: Width::Word,
            start: offset,
            wrap: None,
            warn: None,
            fill: DEFAULT_FILL,
        }
    }

    pub fn sized(mut self, size: ListSize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_width(mut self, width: Width) -> Self {
        self.width = width;
        self
    }

    pub fn with_start(mut self, start: u32) -> Self {
        self.start = start;
        self
    }

    pub fn with_wrap(mut self, wrap: u32) -> Self {
        self.wrap = Some(wrap);
        self
    }

    pub fn with_warn(mut self, warn: u32) -> Self {
        self.warn = Some(warn);
        self
    }

    pub fn with_fill(mut self, fill: u8) -> Self {
        self.fill = fill;
        self
    }

    fn size(&self) -> Result<&ListSize> {
        self.size
            .as_ref()
            .ok_or_else(|| CodecError::Definition("pointer table has no length".into()))
    }

    fn base(&self, index: usize, count: usize) -> u32 {
        match self.wrap {
            Some(wrap) if index > count => wrap,
            _ => self.offset,
        }
    }

    fn check_warn(&self, end: u32) -> Result<u32> {
        match self.warn {
            Some(warn) if end > warn => Err(CodecError::RangeExceeded(format!(
                "payload ends at {end:#08X}, past {warn:#08X}"
            ))),
            _ => Ok(end),
        }
    }

    fn read_payload(&self, rom: &mut Rom, pass: &mut Pass, address: u32) -> Result<Value> {
        rom.enter(address, |rom| {
            let value = self.ty.decode(rom, pass)?;
            self.check_warn(rom.offset()?)?;
            Ok(value)
        })
    }

    fn read_count(&self, rom: &mut Rom) -> Result<usize> {
        match self.wrap {
            Some(_) => Ok(rom.read(Width::Word)? as usize),
            None => Ok(usize::MAX),
        }
    }

    /// Decode entry `index` of the table stored at `table`.
    pub fn entry(&self, rom: &mut Rom, pass: &mut Pass, table: u32, index: u32) -> Result<Value> {
        let (count, pointer) = rom.enter(table, |rom| {
            let count = self.read_count(rom)?;
            let slot = rom.offset()? + index * self.width.bytes() as u32;
            rom.seek(slot)?;
            Ok((count, rom.read(self.width)?))
        })?;
        let address = pointer.saturating_add(self.base(index as usize, count));
        self.read_payload(rom, pass, address)
    }

    /// Write `items` and their payloads, returning the end of the payloads.
    fn write(&self, items: &[Value], rom: &mut Rom, pass: &mut Pass) -> Result<u32> {
        let counter = match self.wrap {
            Some(_) => {
                let at = rom.offset()?;
                let count = u32::try_from(items.len()).unwrap_or(u32::MAX);
                rom.write(count, Width::Word)?;
                Some(at)
            }
            None => None,
        };

        let mut layout = Layout {
            seen: HashMap::new(),
            base: self.offset,
            wrap: self.wrap.zip(counter),
            cursor: self.start,
        };
        for (i, item) in items.iter().enumerate() {
            self.place(&mut layout, i, item, rom, pass)
                .within_with(|| entry_name(i))?;
        }
        Ok(layout.cursor)
    }

    fn place(
        &self,
        layout: &mut Layout,
        i: usize,
        item: &Value,
        rom: &mut Rom,
        pass: &mut Pass,
    ) -> Result<()> {
        let identity = item.identity();
        let address = match layout.seen.get(&identity) {
            Some(&address) => address,
            None => {
                let address = layout.cursor;
                layout.cursor = rom.enter(address, |rom| {
                    self.ty.encode(item, rom, pass)?;
                    self.check_warn(rom.offset()?)
                })?;
                layout.seen.insert(identity, address);
                address
            }
        };
        rom.write(pointer_value(address, layout.base, self.width)?, self.width)?;

        if let Some((wrap, counter)) = layout.wrap {
            if layout.cursor >= wrap {
                layout.base = wrap;
                layout.wrap = None;
                layout.seen.clear();
                rom.enter(counter, |rom| rom.write(i as u32, Width::Word))?;
            }
        }
        Ok(())
    }

    fn decode_item(
        &self,
        rom: &mut Rom,
        pass: &mut Pass,
        shared: &mut HashMap<u32, Value>,
        i: usize,
        count: usize,
    ) -> Result<Value> {
        let address = rom.read(self.width)?.saturating_add(self.base(i, count));
        if let Some(value) = shared.get(&address) {
            return Ok(value.clone());
        }
        let value = self.read_payload(rom, pass, address)?;
        shared.insert(address, value.clone());
        Ok(value)
    }

    fn fill_unused(&self, rom: &mut Rom, end: u32) -> Result<()> {
        let Some(warn) = self.warn else {
            return Ok(());
        };
        let unused = i64::from(warn) - i64::from(end);
        if unused < 0 {
            return Err(CodecError::RangeExceeded(format!(
                "pointer table overflows by {} bytes",
                -unused
            )));
        }
        debug!(end, unused, "Unused pointer table space");
        rom.enter(end, |rom| {
            for _ in 0..unused {
                rom.write(self.fill.into(), Width::Byte)?;
            }
            Ok(())
        })
    }
}

impl Codec for PointerTable {
    fn decode(&self, rom: &mut Rom, pass: &mut Pass) -> Result<Value> {
        let size = self.size()?;
        let count = self.read_count(rom)?;
        let mut shared: HashMap<u32, Value> = HashMap::new();
        let mut items = Vec::new();

        while !size.ended(&items) {
            let i = items.len();
            let item = self
                .decode_item(rom, pass, &mut shared, i, count)
                .within_with(|| entry_name(i))?;
            items.push(item);
        }
        Ok(Value::List(items))
    }

    fn encode(&self, value: &Value, rom: &mut Rom, pass: &mut Pass) -> Result<()> {
        let items = value.as_list()?;
        if let Some(size) = &self.size {
            size.check(items)?;
        }
        let end = self.write(items, rom, pass)?;
        self.fill_unused(rom, end)
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        external
            .as_list()?
            .iter()
            .enumerate()
            .map(|(i, item)| self.ty.parse(item).within_with(|| entry_name(i)))
            .collect::<Result<Vec<_>>>()
            .map(Value::List)
    }

    fn format(&self, value: &Value) -> Result<Value> {
        value
            .as_list()?
            .iter()
            .enumerate()
            .map(|(i, item)| self.ty.format(item).within_with(|| entry_name(i)))
            .collect::<Result<Vec<_>>>()
            .map(Value::List)
    }

    /// Normalize every payload through its external form, so payloads that
    /// only differ in ways the external form cannot show dedup on encode.
    fn optimize(&self, value: &Value, optimizer: &mut Optimizer<'_>) -> Result<Value> {
        let mut items = Vec::new();
        for (i, item) in value.as_list()?.iter().enumerate() {
            let normalized = self
                .ty
                .format(item)
                .and_then(|external| self.ty.parse(&external))
                .and_then(|raw| self.ty.optimize(&raw, optimizer))
                .within_with(|| entry_name(i))?;
            items.push(normalized);
        }
        Ok(Value::List(items))
    }

    fn inner(&self) -> Option<TypeRef> {
        Some(self.ty.clone())
    }
}

/// Use site of an index table: a small index into a shared list of values.
///
/// The list itself is a separate value, read and written through the node
/// returned by [`IndexTable::values`], normally as a section of its own. Use
/// sites show their decimal index. The list keeps its stored order, and is
/// written when the pass finishes, once every index used in the pass has
/// been checked against it.
#[derive(Debug, Clone)]
pub struct IndexTable {
    id: NodeId,
    pub index: UInt,
    pub table_at: u32,
    pub table: Arc<PointerTable>,
}

impl IndexTable {
    pub fn new(width: Width, table_at: u32, table: PointerTable) -> Result<Self> {
        if table.size.is_none() {
            return Err(CodecError::Definition(format!(
                "index table at {table_at:#08X} has no length"
            )));
        }
        Ok(Self {
            id: NodeId::next(),
            index: UInt::decimal(width),
            table_at,
            table: Arc::new(table),
        })
    }

    /// Node for the list of values the indices point into.
    pub fn values(&self) -> IndexValues {
        IndexValues {
            id: self.id,
            table_at: self.table_at,
            table: self.table.clone(),
        }
    }

    fn check_index(&self, index: u32) -> Result<()> {
        match &self.table.size {
            Some(ListSize::Fixed(count)) if index as usize >= *count => {
                Err(CodecError::RangeExceeded(format!(
                    "index {index} is past the {count} values of the index table at {:#08X}",
                    self.table_at
                )))
            }
            _ => Ok(()),
        }
    }
}

impl Codec for IndexTable {
    fn decode(&self, rom: &mut Rom, pass: &mut Pass) -> Result<Value> {
        let index = self.index.decode(rom, pass)?;
        self.check_index(index.as_u32()?)?;
        Ok(index)
    }

    fn encode(&self, value: &Value, rom: &mut Rom, pass: &mut Pass) -> Result<()> {
        let index = value.as_u32()?;
        self.check_index(index)?;
        self.index.encode(value, rom, pass)?;
        pass.reference(self.id, index);
        Ok(())
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        self.index.parse(external)
    }

    fn format(&self, value: &Value) -> Result<Value> {
        self.index.format(value)
    }

    fn inner(&self) -> Option<TypeRef> {
        Some(self.table.ty.clone())
    }
}

/// The flat value list behind an [`IndexTable`].
#[derive(Debug, Clone)]
pub struct IndexValues {
    id: NodeId,
    pub table_at: u32,
    pub table: Arc<PointerTable>,
}

impl Codec for IndexValues {
    fn decode(&self, rom: &mut Rom, pass: &mut Pass) -> Result<Value> {
        rom.enter(self.table_at, |rom| self.table.decode(rom, pass))
    }

    fn encode(&self, value: &Value, _rom: &mut Rom, pass: &mut Pass) -> Result<()> {
        if let Some(size) = &self.table.size {
            size.check(value.as_list()?)?;
        }
        let table: TypeRef = self.table.clone();
        pass.defer(self.id, table, self.table_at, value.clone());
        Ok(())
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        self.table.parse(external)
    }

    fn format(&self, value: &Value) -> Result<Value> {
        self.table.format(value)
    }

    fn optimize(&self, value: &Value, optimizer: &mut Optimizer<'_>) -> Result<Value> {
        self.table.optimize(value, optimizer)
    }

    fn inner(&self) -> Option<TypeRef> {
        Some(self.table.ty.clone())
    }
}
