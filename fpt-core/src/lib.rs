//! Core pipeline for FPT, the document store power tools.
//!
//! This crate holds everything between the document store and the request
//! layer: value decoding and classification, observed-schema inference,
//! keyset-paginated queries, streaming export and the write gate. The HTTP
//! server and CLI in the `fpt` crate are thin bindings over it.
//!
//! # Guarantees
//! - Every operation is stateless; the store is a shared capability passed in
//! - Queries always have a total order, so pages never overlap
//! - Store URLs and write tokens never reach logs or error messages
//!
//! # Architecture
//! - `store`: the [`DocumentStore`] capability trait and its backends
//! - `schema`: type classification and dotted-path inference
//! - `query`: request validation, plan lowering and pagination
//! - `export`: NDJSON and CSV streaming
//! - `security`: the write gate

pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod models;
pub mod query;
pub mod schema;
pub mod security;
pub mod store;
pub mod value;

// Re-export commonly used types
pub use config::FptConfig;
pub use error::{FptError, Result};
pub use export::{ExportFormat, ExportRequest, export_stream};
pub use models::{Document, ExportRow};
pub use query::{QueryRequest, QueryResponse, run_query};
pub use schema::{ObservedSchema, TypeTag, classify, infer_schema};
pub use security::{WriteCredential, assert_write_allowed};
pub use store::{DocumentStore, MemoryStore, StoreOptions, open_store};
pub use value::{Fields, Value};
