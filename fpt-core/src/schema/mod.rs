//! Type classification and observed-schema inference.
//!
//! # Module Structure
//! - `type_mapping`: classification of values into [`TypeTag`]s
//! - `inference`: dotted-path histograms over sampled documents

pub mod inference;
pub mod type_mapping;

pub use inference::{
    DEFAULT_SAMPLE_LIMIT, FieldStats, MAX_SAMPLE_LIMIT, ObservedSchema, SchemaInferrer,
    infer_schema, validate_sample_limit,
};
pub use type_mapping::{TypeTag, classify, classify_untyped};
