//! External text renderings of a formatted section
//!
//! Every representation reads back exactly the tree it rendered. The tabular
//! form is a tab-separated sheet, one row per record:
//!
//! ```text
//! name    price   stats:hp    flags[]
//! Potion  0x32    10          usable,sellable
//! Key     -       -
//! ```
//!
//! Nested maps flatten into `:`-joined column names, `-` is null and list
//! columns carry a `[]` suffix with their items joined by `,`. Every other
//! cell is text.

use serde::{Deserialize, Serialize};
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::error::{Annotate, CodecError, Result};
use crate::value::{Fields, Value};

const NULL_CELL: &str = "-";
const LIST_SUFFIX: &str = "[]";
const PATH_SEPARATOR: char = ':';
const ITEM_SEPARATOR: char = ',';

/// How a section is written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    /// Pretty-printed JSON, 4-space indent
    #[default]
    Json,
    Yaml,
    /// Tab-separated sheet of records
    Tabular,
    /// The formatted value is already a string
    Text,
}

impl Representation {
    /// File extension for this representation.
    pub fn extension(self) -> &'static str {
        match self {
            Representation::Json => "json",
            Representation::Yaml => "yaml",
            Representation::Tabular => "tsv",
            Representation::Text => "txt",
        }
    }

    pub fn render(self, value: &Value) -> Result<String> {
        match self {
            Representation::Json => {
                let mut out = Vec::new();
                let mut serializer =
                    Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
                value
                    .serialize(&mut serializer)
                    .map_err(|e| CodecError::ParseFormat(format!("JSON: {e}")))?;
                String::from_utf8(out).map_err(|e| CodecError::ParseFormat(format!("JSON: {e}")))
            }
            Representation::Yaml => {
                serde_yaml::to_string(value).map_err(|e| CodecError::ParseFormat(format!("YAML: {e}")))
            }
            Representation::Tabular => write_sheet(value),
            Representation::Text => Ok(value.as_text()?.to_string()),
        }
    }

    pub fn read(self, text: &str) -> Result<Value> {
        match self {
            Representation::Json => {
                serde_json::from_str(text).map_err(|e| CodecError::ParseFormat(format!("JSON: {e}")))
            }
            Representation::Yaml => {
                serde_yaml::from_str(text).map_err(|e| CodecError::ParseFormat(format!("YAML: {e}")))
            }
            Representation::Tabular => read_sheet(text),
            Representation::Text => Ok(Value::text(text)),
        }
    }
}

fn check_text(text: &str, in_list: bool) -> Result<()> {
    let forbidden = |c: char| c == '\t' || c == '\n' || c == '\r' || (in_list && c == ITEM_SEPARATOR);
    if text.contains(forbidden) || text == NULL_CELL || (in_list && text.is_empty()) {
        return Err(CodecError::ParseFormat(format!(
            "{text:?} cannot be stored in a tabular cell"
        )));
    }
    Ok(())
}

/// Cells always read back as text, so only text goes in.
fn cell_text(value: &Value, in_list: bool) -> Result<String> {
    match value {
        Value::Text(text) => {
            check_text(text, in_list)?;
            Ok(text.clone())
        }
        other => Err(CodecError::ParseFormat(format!(
            "a {} cannot be stored in a tabular cell",
            other.kind()
        ))),
    }
}

/// Flatten one record into `(column, cell)` pairs.
fn flatten(fields: &Fields, prefix: &str, out: &mut Vec<(String, String)>) -> Result<()> {
    for (key, value) in fields {
        if key.is_empty()
            || key.contains(['\t', '\n', PATH_SEPARATOR])
            || key.ends_with(LIST_SUFFIX)
        {
            return Err(CodecError::ParseFormat(format!(
                "{key:?} cannot be used as a column name"
            )));
        }
        let column = format!("{prefix}{key}");
        match value {
            Value::Map(inner) if inner.is_empty() => {
                return Err(CodecError::ParseFormat(format!(
                    "{column:?} is an empty map and has no columns"
                )));
            }
            Value::Map(inner) => flatten(inner, &format!("{column}{PATH_SEPARATOR}"), out)?,
            Value::List(items) => {
                let cells = items
                    .iter()
                    .map(|item| cell_text(item, true))
                    .collect::<Result<Vec<_>>>()
                    .within(&column)?;
                out.push((
                    format!("{column}{LIST_SUFFIX}"),
                    cells.join(ITEM_SEPARATOR.to_string().as_str()),
                ));
            }
            Value::Null => out.push((column, NULL_CELL.to_string())),
            scalar => out.push((column.clone(), cell_text(scalar, false).within(&column)?)),
        }
    }
    Ok(())
}

fn write_sheet(value: &Value) -> Result<String> {
    let mut rows = Vec::new();
    for (i, record) in value.as_list()?.iter().enumerate() {
        let mut cells = Vec::new();
        flatten(record.as_map()?, "", &mut cells).within_with(|| format!("row {}", i + 1))?;
        rows.push(cells);
    }

    let mut columns: Vec<String> = Vec::new();
    for cells in &rows {
        for (column, _) in cells {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    if !rows.is_empty() {
        lines.push(columns.join("\t"));
    }
    for (i, cells) in rows.iter().enumerate() {
        let mut line = Vec::with_capacity(columns.len());
        for column in &columns {
            let cell = cells
                .iter()
                .find(|(c, _)| c == column)
                .map(|(_, cell)| cell.as_str())
                .ok_or_else(|| {
                    CodecError::ParseFormat(format!("row {} has no {column:?} column", i + 1))
                })?;
            line.push(cell);
        }
        lines.push(line.join("\t"));
    }
    Ok(lines.join("\n"))
}

/// Place `value` at the `:`-separated `column` inside `record`.
fn insert_path(record: &mut Fields, column: &str, value: Value) -> Result<()> {
    let mut segments = column.split(PATH_SEPARATOR).peekable();
    let mut current = record;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return Ok(());
        }
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Map(Fields::new()));
        current = match slot {
            Value::Map(inner) => inner,
            _ => {
                return Err(CodecError::ParseFormat(format!(
                    "column {column:?} conflicts with {segment:?}"
                )));
            }
        };
    }
    Ok(())
}

fn read_sheet(text: &str) -> Result<Value> {
    let mut lines = text.lines().map(|l| l.strip_suffix('\r').unwrap_or(l));
    let Some(header) = lines.next().filter(|h| !h.is_empty()) else {
        return Ok(Value::List(Vec::new()));
    };
    let columns: Vec<&str> = header.split('\t').collect();

    let mut records = Vec::new();
    for (i, line) in lines.enumerate() {
        if line.is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split('\t').collect();
        if cells.len() != columns.len() {
            return Err(CodecError::ParseFormat(format!(
                "row {} has {} cells, expected {}",
                i + 1,
                cells.len(),
                columns.len()
            )));
        }

        let mut record = Fields::new();
        for (column, cell) in columns.iter().zip(cells) {
            let (path, value) = match column.strip_suffix(LIST_SUFFIX) {
                Some(path) if cell.is_empty() => (path, Value::List(Vec::new())),
                Some(path) => (
                    path,
                    Value::List(cell.split(ITEM_SEPARATOR).map(Value::text).collect()),
                ),
                None if cell == NULL_CELL => (*column, Value::Null),
                None => (*column, Value::text(cell)),
            };
            insert_path(&mut record, path, value)?;
        }
        records.push(Value::Map(record));
    }
    Ok(Value::List(records))
}
