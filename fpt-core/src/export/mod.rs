//! Streaming export of a collection to NDJSON or CSV.
//!
//! # Module Structure
//! - `csv`: field escaping, column inference and the CSV writer
//! - `ndjson`: the NDJSON writer
//!
//! [`export_stream`] validates the request up front, then pages through the
//! store in document-id order and yields one encoded chunk per page, so at
//! most one page of rows is in memory at a time. The one exception is CSV
//! with inferred columns: the header must name every key of every row, so
//! that export is fetched as a single page of `limit` rows.

pub mod csv;
pub mod ndjson;

use crate::Result;
use crate::error::FptError;
use crate::models::ExportRow;
use crate::query::{Cursor, MAX_EXPORT_LIMIT, PlanOrder, QueryPlan, resolve_cursor, validate_collection};
use crate::store::DocumentStore;
use bytes::Bytes;
use chrono::NaiveDate;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;

pub use self::csv::{CsvWriter, escape_csv_field, infer_columns, parse_columns, render_cell};
pub use self::ndjson::NdjsonWriter;

/// Rows exported when the caller gives no limit.
pub const DEFAULT_EXPORT_LIMIT: u32 = 1000;

/// Rows fetched per store round trip.
pub const DEFAULT_EXPORT_PAGE_SIZE: u32 = 500;

/// Output format of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Newline-delimited JSON
    Jsonl,
    /// Comma-separated values
    Csv,
}

impl ExportFormat {
    /// Parses `jsonl` or `csv`.
    ///
    /// # Errors
    /// Returns a validation error on the `format` field for anything else.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "jsonl" => Ok(Self::Jsonl),
            "csv" => Ok(Self::Csv),
            other => Err(FptError::validation(
                "format",
                format!("must be 'jsonl' or 'csv', got '{}'", other),
            )),
        }
    }

    /// HTTP content type.
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Jsonl => "application/x-ndjson",
            Self::Csv => "text/csv; charset=utf-8",
        }
    }

    /// File extension.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Csv => "csv",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// `firestore-<collection>-<YYYY-MM-DD>.<ext>`.
///
/// Path separators in subcollection paths become `_`.
pub fn export_filename(collection: &str, format: ExportFormat, date: NaiveDate) -> String {
    format!(
        "firestore-{}-{}.{}",
        collection.replace('/', "_"),
        date.format("%Y-%m-%d"),
        format.extension()
    )
}

/// A validated-on-demand export request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    /// Collection to export
    pub collection: String,
    /// Output format
    pub format: ExportFormat,
    /// Maximum number of rows, `1..=5000`
    pub limit: u32,
    /// Resume after this document id
    pub start_after: Option<String>,
    /// CSV columns; inferred from the rows when `None`
    pub columns: Option<Vec<String>>,
}

impl ExportRequest {
    /// Creates a request with the default limit.
    pub fn new(collection: impl Into<String>, format: ExportFormat) -> Self {
        Self {
            collection: collection.into(),
            format,
            limit: DEFAULT_EXPORT_LIMIT,
            start_after: None,
            columns: None,
        }
    }

    /// Sets the row limit.
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Resumes after a document id.
    pub fn with_start_after(mut self, id: impl Into<String>) -> Self {
        self.start_after = Some(id.into());
        self
    }

    /// Fixes the CSV column set.
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Checks collection, limit and cursor.
    ///
    /// # Errors
    /// Returns a validation error naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        validate_collection(&self.collection)?;
        if !(1..=MAX_EXPORT_LIMIT).contains(&self.limit) {
            return Err(FptError::validation(
                "limit",
                format!("must be between 1 and {}, got {}", MAX_EXPORT_LIMIT, self.limit),
            ));
        }
        if self.start_after.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(FptError::validation("startAfter", "must not be empty"));
        }
        Ok(())
    }

    /// Suggested download file name for today's date.
    pub fn filename(&self) -> String {
        export_filename(
            &self.collection,
            self.format,
            chrono::Utc::now().date_naive(),
        )
    }
}

enum Phase {
    Start,
    Paging,
    Done,
}

struct ExportState {
    store: Arc<dyn DocumentStore>,
    request: ExportRequest,
    page_size: u32,
    phase: Phase,
    cursor: Option<Cursor>,
    remaining: u32,
    columns: Vec<String>,
    exported: u64,
}

impl ExportState {
    async fn fetch(&self, limit: u32) -> Result<Vec<ExportRow>> {
        let plan = QueryPlan {
            start_after: self.cursor.clone(),
            ..QueryPlan::scan(self.request.collection.clone(), limit)
        };
        self.store.run_query(&plan).await
    }

    fn encode(&self, rows: &[ExportRow], with_header: bool) -> Result<Bytes> {
        let encode_error = |source: std::io::Error| FptError::Io {
            context: format!("Failed to encode export of '{}'", self.request.collection),
            source,
        };
        match self.request.format {
            ExportFormat::Jsonl => {
                let mut writer = NdjsonWriter::new(Vec::new());
                for row in rows {
                    writer.write_row(row).map_err(encode_error)?;
                }
                Ok(Bytes::from(writer.into_inner()))
            }
            ExportFormat::Csv => {
                let mut writer = CsvWriter::new(Vec::new(), &self.columns);
                if with_header {
                    writer.write_header().map_err(encode_error)?;
                }
                for row in rows {
                    writer.write_row(row).map_err(encode_error)?;
                }
                Ok(Bytes::from(writer.into_inner()))
            }
        }
    }

    fn record(&mut self, rows: usize) {
        let count = u32::try_from(rows).unwrap_or(u32::MAX);
        self.remaining = self.remaining.saturating_sub(count);
        self.exported = self.exported.saturating_add(u64::from(count));
    }

    async fn next_chunk(mut self) -> Result<Option<(Bytes, Self)>> {
        let mut header = false;

        match self.phase {
            Phase::Done => return Ok(None),
            Phase::Start => {
                if let Some(id) = self.request.start_after.clone() {
                    self.cursor = resolve_cursor(
                        self.store.as_ref(),
                        &self.request.collection,
                        &id,
                        &PlanOrder::default(),
                    )
                    .await?;
                }
                self.phase = Phase::Paging;

                if self.request.format == ExportFormat::Csv {
                    match self.request.columns.clone() {
                        Some(columns) => {
                            self.columns = columns;
                            header = true;
                        }
                        None => {
                            let rows = self.fetch(self.remaining).await?;
                            self.columns = infer_columns(&rows);
                            let chunk = self.encode(&rows, true)?;
                            self.record(rows.len());
                            self.finish();
                            return Ok(Some((chunk, self)));
                        }
                    }
                }
            }
            Phase::Paging => {}
        }

        let page_limit = self.page_size.min(self.remaining);
        let rows = if page_limit == 0 {
            Vec::new()
        } else {
            self.fetch(page_limit).await?
        };

        if rows.len() < usize::try_from(page_limit).unwrap_or(usize::MAX) {
            self.finish();
        }
        if rows.is_empty() && !header {
            self.finish();
            return Ok(None);
        }

        let chunk = self.encode(&rows, header)?;
        self.record(rows.len());
        if let Some(last) = rows.last() {
            self.cursor = Some(Cursor {
                id: last.id.clone(),
                sort_value: None,
            });
        }
        if self.remaining == 0 {
            self.finish();
        }
        Ok(Some((chunk, self)))
    }

    fn finish(&mut self) {
        if !matches!(self.phase, Phase::Done) {
            self.phase = Phase::Done;
            tracing::info!(
                collection = %self.request.collection,
                format = %self.request.format,
                rows = self.exported,
                "Export completed"
            );
        }
    }
}

/// Streams an export as encoded chunks.
///
/// Validation happens before the stream is returned, so a bad request never
/// produces a partial body. A store failure mid-stream ends the stream with
/// that error.
///
/// # Errors
/// Returns a validation error for a malformed request.
pub fn export_stream(
    store: Arc<dyn DocumentStore>,
    request: ExportRequest,
    page_size: u32,
) -> Result<BoxStream<'static, Result<Bytes>>> {
    request.validate()?;

    tracing::debug!(
        collection = %request.collection,
        format = %request.format,
        limit = request.limit,
        inferred_columns = request.format == ExportFormat::Csv && request.columns.is_none(),
        "Starting export"
    );

    let state = ExportState {
        store,
        page_size: page_size.clamp(1, MAX_EXPORT_LIMIT),
        phase: Phase::Start,
        cursor: None,
        remaining: request.limit,
        columns: Vec::new(),
        exported: 0,
        request,
    };

    Ok(stream::try_unfold(state, ExportState::next_chunk).boxed())
}
