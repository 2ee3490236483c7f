//! Bijective value <-> label tables

use std::collections::BTreeMap;

use hashbrown::HashMap;

use crate::error::{CodecError, Result};

/// Substitute used when a lookup misses in fallback mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallback {
    pub value: u32,
    pub label: String,
}

/// Raw value <-> label table.
///
/// Both sides are unique; a duplicate value or label is rejected when the
/// table is built. Without a [`Fallback`] the table is strict and every miss
/// is a [`CodecError::LookupMissing`].
#[derive(Debug, Clone, Default)]
pub struct Lookup {
    labels: BTreeMap<u32, String>,
    values: HashMap<String, u32>,
    fallback: Option<Fallback>,
}

impl Lookup {
    pub fn new<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        let mut lookup = Lookup::default();
        for (value, label) in entries {
            lookup.insert(value, label.into())?;
        }
        Ok(lookup)
    }

    /// Table mapping `0..labels.len()` to `labels` in order.
    pub fn indexed<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(labels.into_iter().enumerate().map(|(i, l)| (i as u32, l)))
    }

    fn insert(&mut self, value: u32, label: String) -> Result<()> {
        if let Some(existing) = self.labels.get(&value) {
            return Err(CodecError::Definition(format!(
                "lookup already maps {value:#x} to {existing:?}"
            )));
        }
        if let Some(existing) = self.values.get(&label) {
            return Err(CodecError::Definition(format!(
                "lookup label {label:?} already names {existing:#x}"
            )));
        }
        self.values.insert(label.clone(), value);
        self.labels.insert(value, label);
        Ok(())
    }

    /// `0 = false`, `1 = true`.
    pub fn boolean() -> Self {
        let labels = BTreeMap::from([(0, "false".to_string()), (1, "true".to_string())]);
        let values = labels.iter().map(|(v, l)| (l.clone(), *v)).collect();
        Self {
            labels,
            values,
            fallback: None,
        }
    }

    /// Switch to fallback mode.
    pub fn with_fallback(mut self, value: u32, label: impl Into<String>) -> Self {
        self.fallback = Some(Fallback {
            value,
            label: label.into(),
        });
        self
    }

    pub fn is_strict(&self) -> bool {
        self.fallback.is_none()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn has_value(&self, value: u32) -> bool {
        self.labels.contains_key(&value)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.values.contains_key(label)
    }

    /// Largest raw value in the table.
    pub fn max_value(&self) -> Option<u32> {
        self.labels.keys().next_back().copied()
    }

    /// Entries in ascending value order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.labels.iter().map(|(v, l)| (*v, l.as_str()))
    }

    /// Label for a raw value.
    pub fn label(&self, value: u32) -> Result<&str> {
        match (self.labels.get(&value), &self.fallback) {
            (Some(label), _) => Ok(label),
            (None, Some(fallback)) => {
                tracing::warn!("lookup has no label for {value:#x}, using {:?}", fallback.label);
                Ok(&fallback.label)
            }
            (None, None) => Err(CodecError::LookupMissing(format!("value: {value} ({value:#x})"))),
        }
    }

    /// Raw value for a label.
    pub fn value(&self, label: &str) -> Result<u32> {
        match (self.values.get(label), &self.fallback) {
            (Some(value), _) => Ok(*value),
            (None, Some(fallback)) => {
                tracing::warn!("lookup has no value for {label:?}, using {:#x}", fallback.value);
                Ok(fallback.value)
            }
            (None, None) => Err(CodecError::LookupMissing(format!("label: {label:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_lookup() {
        let lookup = Lookup::new([(0u32, "fire"), (1, "ice"), (7, "bolt")]).unwrap();
        assert_eq!(lookup.label(1).unwrap(), "ice");
        assert_eq!(lookup.value("bolt").unwrap(), 7);
        assert_eq!(lookup.max_value(), Some(7));
        assert!(matches!(lookup.label(2), Err(CodecError::LookupMissing(_))));
        assert!(matches!(lookup.value("wind"), Err(CodecError::LookupMissing(_))));
    }

    #[test]
    fn test_boolean_lookup() {
        let lookup = Lookup::boolean();
        assert!(lookup.is_strict());
        assert_eq!(lookup.len(), 2);
        assert_eq!(lookup.label(1).unwrap(), "true");
        assert_eq!(lookup.value("false").unwrap(), 0);
    }

    #[test]
    fn test_fallback_lookup() {
        let lookup = Lookup::indexed(["a", "b"]).unwrap().with_fallback(0xFF, "?");
        assert!(!lookup.is_strict());
        assert_eq!(lookup.label(9).unwrap(), "?");
        assert_eq!(lookup.value("zz").unwrap(), 0xFF);
        assert_eq!(lookup.value("b").unwrap(), 1);
    }

    #[test]
    fn test_duplicates_rejected() {
        assert!(matches!(
            Lookup::new([(0u32, "a"), (0, "b")]),
            Err(CodecError::Definition(_))
        ));
        assert!(matches!(
            Lookup::new([(0u32, "a"), (1, "a")]),
            Err(CodecError::Definition(_))
        ));
    }
}
