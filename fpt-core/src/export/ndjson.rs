//! Newline-delimited JSON encoding of export rows.

use crate::models::ExportRow;
use std::io::{self, Write};

/// Streaming NDJSON writer.
///
/// Each row becomes one line: `{"id": …, <data fields>}` with `id` written
/// first and values in their untyped JSON encoding. Data fields are spread
/// over the document id, so a top-level `id` field replaces it.
#[derive(Debug)]
pub struct NdjsonWriter<W: Write> {
    inner: W,
}

impl<W: Write> NdjsonWriter<W> {
    /// Wraps a writer.
    pub const fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Writes one row as a line.
    pub fn write_row(&mut self, row: &ExportRow) -> io::Result<()> {
        self.inner.write_all(b"{\"id\":")?;
        match row.data.get("id") {
            Some(shadowing) => serde_json::to_writer(&mut self.inner, shadowing)?,
            None => serde_json::to_writer(&mut self.inner, &row.id)?,
        }
        for (key, value) in row.data.iter().filter(|(key, _)| key.as_str() != "id") {
            self.inner.write_all(b",")?;
            serde_json::to_writer(&mut self.inner, key)?;
            self.inner.write_all(b":")?;
            serde_json::to_writer(&mut self.inner, value)?;
        }
        self.inner.write_all(b"}\n")
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}
