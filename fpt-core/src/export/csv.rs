//! CSV encoding of export rows.
//!
//! Every line ends in `\n`. The first column is always `id`; the rest come
//! from the caller or from [`infer_columns`].

use crate::models::ExportRow;
use crate::value::Value;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::io::{self, Write};

/// Escapes one CSV field.
///
/// `\r\n` and lone `\r` are normalised to `\n` first; a field containing a
/// comma, a double quote or a newline is then wrapped in double quotes with
/// embedded quotes doubled.
///
/// # Example
///
/// ```rust
/// use fpt_core::export::escape_csv_field;
///
/// assert_eq!(escape_csv_field("plain"), "plain");
/// assert_eq!(escape_csv_field("a,\"b\""), "\"a,\"\"b\"\"\"");
/// assert_eq!(escape_csv_field("x\r\ny"), "\"x\ny\"");
/// ```
pub fn escape_csv_field(raw: &str) -> Cow<'_, str> {
    let normalized: Cow<'_, str> = if raw.contains('\r') {
        Cow::Owned(raw.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(raw)
    };

    if normalized.contains([',', '"', '\n']) {
        Cow::Owned(format!("\"{}\"", normalized.replace('"', "\"\"")))
    } else {
        normalized
    }
}

/// Renders a cell before escaping.
///
/// Strings pass through, `null` is empty and everything else is written in
/// its untyped JSON encoding.
pub fn render_cell(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s),
        Value::Null => Cow::Borrowed(""),
        other => Cow::Owned(other.to_untyped().to_string()),
    }
}

/// Parses a caller-supplied column list (`a, b,,c`).
///
/// Entries are trimmed and empties dropped; `None` when nothing is left, in
/// which case columns are inferred.
pub fn parse_columns(raw: Option<&str>) -> Option<Vec<String>> {
    let columns: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    (!columns.is_empty()).then_some(columns)
}

/// Sorted union of the top-level keys of `rows`.
pub fn infer_columns(rows: &[ExportRow]) -> Vec<String> {
    rows.iter()
        .flat_map(|row| row.data.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .cloned()
        .collect()
}

/// Streaming CSV writer over a fixed column set.
#[derive(Debug)]
pub struct CsvWriter<'c, W: Write> {
    inner: W,
    columns: &'c [String],
}

impl<'c, W: Write> CsvWriter<'c, W> {
    /// Creates a writer; nothing is written until the header or a row is.
    pub const fn new(inner: W, columns: &'c [String]) -> Self {
        Self { inner, columns }
    }

    /// Writes `id` followed by the columns.
    pub fn write_header(&mut self) -> io::Result<()> {
        self.inner.write_all(b"id")?;
        for column in self.columns {
            self.inner.write_all(b",")?;
            self.inner.write_all(escape_csv_field(column).as_bytes())?;
        }
        self.inner.write_all(b"\n")
    }

    /// Writes one row; absent columns become empty fields.
    pub fn write_row(&mut self, row: &ExportRow) -> io::Result<()> {
        self.inner.write_all(escape_csv_field(&row.id).as_bytes())?;
        for column in self.columns {
            self.inner.write_all(b",")?;
            if let Some(value) = row.data.get(column) {
                self.inner
                    .write_all(escape_csv_field(&render_cell(value)).as_bytes())?;
            }
        }
        self.inner.write_all(b"\n")
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}
