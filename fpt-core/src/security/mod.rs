//! Security utilities for the write path.
//!
//! Reads are unauthenticated; mutations pass through the write gate, which
//! checks a shared-secret token held in zeroizing memory.

pub mod write_gate;

pub use write_gate::{
    WRITE_TOKEN_HEADER, WriteCredential, assert_write_allowed, generate_write_token,
};
