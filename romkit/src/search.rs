//! Node lookup by path

use crate::error::{CodecError, Result};
use crate::types::TypeRef;

/// Find the node at `path` below `root`.
///
/// Each segment names a child (struct field, fork option, bit field).
/// Wrapping nodes such as pointers, readers and lists are passed through
/// without consuming a segment.
pub fn search(root: &TypeRef, path: &[&str]) -> Result<TypeRef> {
    let mut current = root.clone();
    for (i, segment) in path.iter().enumerate() {
        loop {
            if let Some(child) = current.child(segment) {
                current = child;
                break;
            }
            current = current.inner().ok_or_else(|| {
                CodecError::Definition(format!(
                    "no node at {:?} (stopped at {segment:?})",
                    path[..=i].join(":")
                ))
            })?;
        }
    }
    Ok(current)
}
