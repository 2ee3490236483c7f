//! Per-pass state
//!
//! Schema nodes are immutable. Whatever a node has to remember between two
//! calls in the same decode or encode pass is kept here, keyed by the node's
//! [`NodeId`]. A fresh [`Pass`] is created for every top-level pass, so
//! nothing leaks from one pass into the next.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use indexmap::IndexMap;
use tracing::debug;

use crate::error::{Annotate, CodecError, Result};
use crate::rom::Rom;
use crate::types::TypeRef;
use crate::value::Value;

/// Identity of a stateful schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        NodeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Payload allocation for one pointer node.
#[derive(Debug, Clone)]
pub struct Allocation {
    /// Next free address
    pub cursor: u32,
    placed: HashMap<String, u32>,
}

impl Allocation {
    fn new(base: u32) -> Self {
        Self {
            cursor: base,
            placed: HashMap::new(),
        }
    }

    /// Address already holding a payload with this identity.
    pub fn placed(&self, identity: &str) -> Option<u32> {
        self.placed.get(identity).copied()
    }

    /// Record a payload written at `address` ending at `end`.
    pub fn place(&mut self, identity: String, address: u32, end: u32) {
        self.placed.insert(identity, address);
        self.cursor = self.cursor.max(end);
    }
}

/// Index table values waiting for the end of an encode pass.
#[derive(Debug)]
struct PendingTable {
    table: TypeRef,
    address: u32,
    values: Value,
}

/// Mutable state of one decode or encode pass.
#[derive(Debug, Default)]
pub struct Pass {
    allocations: HashMap<NodeId, Allocation>,
    references: HashMap<NodeId, u32>,
    pending: IndexMap<NodeId, PendingTable>,
}

impl Pass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocation of `id`, starting at `base` on first use.
    pub fn allocation(&mut self, id: NodeId, base: u32) -> &mut Allocation {
        self.allocations
            .entry(id)
            .or_insert_with(|| Allocation::new(base))
    }

    /// Record that a use site of index table `id` wrote `index`.
    pub fn reference(&mut self, id: NodeId, index: u32) {
        let highest = self.references.entry(id).or_insert(index);
        *highest = (*highest).max(index);
    }

    /// Highest index of table `id` written so far.
    pub fn highest_reference(&self, id: NodeId) -> Option<u32> {
        self.references.get(&id).copied()
    }

    /// Hold the values of index table `id` until [`Pass::finish`], which
    /// writes them through `table` at `address`.
    pub fn defer(&mut self, id: NodeId, table: TypeRef, address: u32, values: Value) {
        self.pending.insert(
            id,
            PendingTable {
                table,
                address,
                values,
            },
        );
    }

    /// Emit every deferred index table.
    ///
    /// A table is only written if every index used in the pass points into
    /// it. Emitting a table may defer further tables, so this runs until
    /// nothing is pending.
    pub fn finish(&mut self, rom: &mut Rom) -> Result<()> {
        while let Some((id, pending)) = self.pending.shift_remove_index(0) {
            let count = pending.values.as_list()?.len();
            let name = format!("IndexTable({:#X})", pending.address);
            if let Some(highest) = self.highest_reference(id).filter(|&h| h as usize >= count) {
                let err = CodecError::RangeExceeded(format!(
                    "index {highest} is past the {count} values of the index table"
                ));
                return Err(err.within(name));
            }
            rom.enter(pending.address, |rom| pending.table.encode(&pending.values, rom, self))
                .within(&name)?;
            debug!(address = pending.address, count, "Index table emitted");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_ids_are_unique() {
        let a = NodeId::next();
        let b = NodeId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_allocation_starts_at_base() {
        let mut pass = Pass::new();
        let id = NodeId::next();
        let allocation = pass.allocation(id, 0xC10000);
        assert_eq!(allocation.cursor, 0xC10000);
        allocation.place("\"a\"".into(), 0xC10000, 0xC10004);

        let again = pass.allocation(id, 0);
        assert_eq!(again.cursor, 0xC10004);
        assert_eq!(again.placed("\"a\""), Some(0xC10000));
        assert_eq!(again.placed("\"b\""), None);
    }

    #[test]
    fn test_highest_reference() {
        let mut pass = Pass::new();
        let id = NodeId::next();
        assert_eq!(pass.highest_reference(id), None);
        pass.reference(id, 4);
        pass.reference(id, 1);
        assert_eq!(pass.highest_reference(id), Some(4));
        assert_eq!(Pass::new().highest_reference(id), None);
    }
}
