//! Homogeneous sequences

use std::fmt;
use std::sync::Arc;

use crate::error::{Annotate, CodecError, Result};
use crate::pass::Pass;
use crate::rom::Rom;
use crate::schema::Optimizer;
use crate::types::{Codec, TypeRef};
use crate::value::Value;

/// How a list decides it has ended while decoding.
#[derive(Clone)]
pub enum ListSize {
    /// Exactly this many items
    Fixed(usize),
    /// Ends with (and includes) an item equal to this raw value
    Terminator(Value),
    /// Ends when the predicate holds for the items read so far
    Until(Arc<dyn Fn(&[Value]) -> bool + Send + Sync>),
}

impl ListSize {
    pub fn ended(&self, items: &[Value]) -> bool {
        match self {
            ListSize::Fixed(n) => items.len() >= *n,
            ListSize::Terminator(end) => items.last() == Some(end),
            ListSize::Until(predicate) => predicate(items),
        }
    }

    /// Check that a list about to be encoded would decode back to itself.
    ///
    /// Decoding stops at the first prefix that ends the list, so an early
    /// terminator would drop every item after it.
    pub fn check(&self, items: &[Value]) -> Result<()> {
        match self {
            ListSize::Fixed(n) if items.len() != *n => {
                return Err(CodecError::Validation(format!(
                    "expected {n} items, found {}",
                    items.len()
                )));
            }
            ListSize::Fixed(_) => return Ok(()),
            _ => {}
        }
        match (0..=items.len()).find(|&len| self.ended(&items[..len])) {
            Some(len) if len == items.len() => Ok(()),
            Some(len) => Err(CodecError::Validation(format!(
                "list ends after {len} items but has {}",
                items.len()
            ))),
            None => Err(match self {
                ListSize::Terminator(end) => {
                    CodecError::Validation(format!("list must end with {}", end.identity()))
                }
                _ => CodecError::Validation("list does not satisfy its end condition".into()),
            }),
        }
    }
}

impl fmt::Debug for ListSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListSize::Fixed(n) => write!(f, "Fixed({n})"),
            ListSize::Terminator(end) => write!(f, "Terminator({})", end.identity()),
            ListSize::Until(_) => f.write_str("Until(<predicate>)"),
        }
    }
}

pub(crate) fn item_name(i: usize) -> String {
    format!("List({i})")
}

/// Items of one type stored back to back.
#[derive(Debug, Clone)]
pub struct List {
    pub ty: TypeRef,
    pub size: ListSize,
}

impl List {
    pub fn new(ty: TypeRef, size: ListSize) -> Self {
        Self { ty, size }
    }
}

impl Codec for List {
    fn decode(&self, rom: &mut Rom, pass: &mut Pass) -> Result<Value> {
        let mut items = Vec::new();
        while !self.size.ended(&items) {
            let item = self.ty.decode(rom, pass).within_with(|| item_name(items.len()))?;
            items.push(item);
        }
        Ok(Value::List(items))
    }

    fn encode(&self, value: &Value, rom: &mut Rom, pass: &mut Pass) -> Result<()> {
        let items = value.as_list()?;
        self.size.check(items)?;
        for (i, item) in items.iter().enumerate() {
            self.ty.encode(item, rom, pass).within_with(|| item_name(i))?;
        }
        Ok(())
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        external
            .as_list()?
            .iter()
            .enumerate()
            .map(|(i, item)| self.ty.parse(item).within_with(|| item_name(i)))
            .collect::<Result<Vec<_>>>()
            .map(Value::List)
    }

    fn format(&self, value: &Value) -> Result<Value> {
        value
            .as_list()?
            .iter()
            .enumerate()
            .map(|(i, item)| self.ty.format(item).within_with(|| item_name(i)))
            .collect::<Result<Vec<_>>>()
            .map(Value::List)
    }

    fn optimize(&self, value: &Value, optimizer: &mut Optimizer<'_>) -> Result<Value> {
        let mut items = Vec::new();
        for (i, item) in value.as_list()?.iter().enumerate() {
            items.push(self.ty.optimize(item, optimizer).within_with(|| item_name(i))?);
        }
        Ok(Value::List(items))
    }

    fn inner(&self) -> Option<TypeRef> {
        Some(self.ty.clone())
    }
}
