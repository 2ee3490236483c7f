//! Codec error types
//!
//! Every structural node re-raises child errors wrapped in
//! [`CodecError::Context`], so the rendered message reads as a `::`-joined
//! path from the section name down to the failing leaf:
//!
//! ```text
//! items::List(12)::name::lookup missing label: "Ω"
//! ```

use thiserror::Error;

/// Result alias used throughout the codec.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Codec error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Seek, read or write outside the image
    #[error("addressing error: {0}")]
    Addressing(String),

    /// A constant or structural expectation did not hold
    #[error("validation failed: {0}")]
    Validation(String),

    /// Bits set outside every declared mask
    #[error("unhandled bits: {0:#x}")]
    UnhandledBits(u32),

    /// Unmapped value or label in a strict lookup table
    #[error("lookup missing {0}")]
    LookupMissing(String),

    /// A read, write or allocation crossed a configured boundary
    #[error("range exceeded: {0}")]
    RangeExceeded(String),

    /// Tagged-union discriminant or name with no matching option
    #[error("missing option {key}; known options: {}", options.join(", "))]
    SchemaMissingOption { key: String, options: Vec<String> },

    /// Malformed external text
    #[error("parse error: {0}")]
    ParseFormat(String),

    /// Invalid schema construction (detected before any pass runs)
    #[error("invalid definition: {0}")]
    Definition(String),

    /// Error raised inside a named node
    #[error("{path}::{source}")]
    Context {
        path: String,
        source: Box<CodecError>,
    },
}

impl CodecError {
    /// Wrap this error in a named context segment.
    pub fn within(self, name: impl Into<String>) -> Self {
        CodecError::Context {
            path: name.into(),
            source: Box::new(self),
        }
    }

    /// The underlying error with all context segments removed.
    pub fn root(&self) -> &CodecError {
        match self {
            CodecError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Context segments from outermost to innermost.
    pub fn path(&self) -> Vec<&str> {
        let mut segments = Vec::new();
        let mut current = self;
        while let CodecError::Context { path, source } = current {
            segments.push(path.as_str());
            current = source;
        }
        segments
    }
}

/// Annotate a fallible result with the name of the node that produced it.
pub trait Annotate<T> {
    fn within(self, name: &str) -> Result<T>;
    fn within_with<F: FnOnce() -> String>(self, name: F) -> Result<T>;
}

impl<T> Annotate<T> for Result<T> {
    fn within(self, name: &str) -> Result<T> {
        self.map_err(|e| e.within(name))
    }

    fn within_with<F: FnOnce() -> String>(self, name: F) -> Result<T> {
        self.map_err(|e| e.within(name()))
    }
}
