//! Schema node algebra
//!
//! Every node implements the four directions of the round trip:
//!
//! | operation | input                 | output              |
//! |-----------|-----------------------|---------------------|
//! | `decode`  | ROM cursor            | raw [`Value`]       |
//! | `encode`  | raw value, ROM cursor | bytes at the cursor |
//! | `parse`   | external value        | raw value           |
//! | `format`  | raw value             | external value      |
//!
//! Nodes are immutable once built and shared as [`TypeRef`]s. Anything that
//! must be remembered during a pass (pointer allocation, index tables) lives
//! in the [`Pass`] handed to `decode`/`encode`.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::pass::Pass;
use crate::rom::Rom;
use crate::schema::Optimizer;
use crate::value::Value;

pub mod bits;
pub mod fork;
pub mod graphics;
pub mod list;
pub mod pointer;
pub mod reference;
pub mod scalar;
pub mod structs;
pub mod table;
pub mod text;

pub use bits::{BitField, Bitmask, Bits};
pub use fork::{Fork, ForkArm, ForkOption};
pub use graphics::{Grid, Tile};
pub use list::{List, ListSize};
pub use pointer::{Pointer, PointerStruct, Reader, Rewind};
pub use reference::{EnumFrom, LabelSource};
pub use scalar::{Empty, Enum, Fixed, Placeholder, UInt};
pub use structs::{Field, FlatStruct, ParallelList, Presence, Struct};
pub use table::{IndexTable, IndexValues, PointerTable};
pub use text::{Char, Text, TextLength, TextScript};

/// Shared handle to a schema node.
pub type TypeRef = Arc<dyn Codec>;

/// A schema node.
pub trait Codec: fmt::Debug + Send + Sync {
    /// Read a raw value at the cursor.
    fn decode(&self, rom: &mut Rom, pass: &mut Pass) -> Result<Value>;

    /// Write a raw value at the cursor.
    fn encode(&self, value: &Value, rom: &mut Rom, pass: &mut Pass) -> Result<()>;

    /// Turn an external value back into a raw value.
    fn parse(&self, external: &Value) -> Result<Value>;

    /// Render a raw value in its external shape.
    fn format(&self, value: &Value) -> Result<Value>;

    /// Rewrite a decoded value into an equivalent, cheaper one.
    fn optimize(&self, value: &Value, _optimizer: &mut Optimizer<'_>) -> Result<Value> {
        Ok(value.clone())
    }

    /// Named child node (struct field, fork option).
    fn child(&self, _name: &str) -> Option<TypeRef> {
        None
    }

    /// Wrapped node, for nodes that delegate to a single inner type.
    fn inner(&self) -> Option<TypeRef> {
        None
    }
}

/// Wrap a node in a [`TypeRef`].
pub fn node<C: Codec + 'static>(codec: C) -> TypeRef {
    Arc::new(codec)
}
