//! Nodes derived from another section's data

use serde::{Deserialize, Serialize};

use crate::error::{Annotate, CodecError, Result};
use crate::lookup::Lookup;
use crate::rom::Width;
use crate::schema::State;
use crate::types::Enum;
use crate::value::Value;

/// Anything that can hand out a section's value, typically a
/// [`Resolver`](crate::schema::Resolver) in the middle of a pass.
pub trait LabelSource {
    fn fetch(&mut self, section: &str, state: State) -> Result<Value>;
}

/// Enum whose labels are read from the records of another section.
///
/// Record `i` supplies the label for value `i`; `path` walks nested maps
/// inside each record down to the label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumFrom {
    pub section: String,
    pub path: Vec<String>,
    #[serde(default)]
    pub width: Width,
    #[serde(default)]
    pub state: State,
}

impl EnumFrom {
    pub fn new(section: impl Into<String>, path: &[&str]) -> Self {
        Self {
            section: section.into(),
            path: path.iter().map(|s| s.to_string()).collect(),
            width: Width::Byte,
            state: State::Formatted,
        }
    }

    /// Labels in record order.
    pub fn labels(&self, source: &mut dyn LabelSource) -> Result<Vec<String>> {
        let records = source.fetch(&self.section, self.state)?;
        records
            .as_list()
            .within(&self.section)?
            .iter()
            .enumerate()
            .map(|(i, record)| self.label(record).within_with(|| format!("{}({i})", self.section)))
            .collect()
    }

    fn label(&self, record: &Value) -> Result<String> {
        let mut value = record;
        for segment in &self.path {
            value = value.field(segment).within(segment)?;
        }
        match value {
            Value::Text(text) => Ok(text.clone()),
            Value::Int(v) => Ok(v.to_string()),
            other => Err(CodecError::Validation(format!(
                "label at {:?} is a {}, expected text",
                self.path.join(":"),
                other.kind()
            ))),
        }
    }

    /// Build the enum node.
    pub fn build(&self, source: &mut dyn LabelSource) -> Result<Enum> {
        let labels = self.labels(source)?;
        let lookup = Lookup::indexed(labels).map_err(|e| match e {
            CodecError::Definition(msg) => {
                CodecError::Definition(format!("labels from {:?}: {msg}", self.section))
            }
            other => other,
        })?;
        if let Some(max) = lookup.max_value() {
            if max > self.width.max() {
                return Err(CodecError::Definition(format!(
                    "{} labels from {:?} do not fit {} byte(s)",
                    lookup.len(),
                    self.section,
                    self.width.bytes()
                )));
            }
        }
        Ok(Enum::new(self.width, lookup))
    }
}
