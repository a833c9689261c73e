//! Local HTTP API and CLI plumbing for FPT.
//!
//! The binary in `main.rs` parses flags, merges them with the config file and
//! environment into a [`server::ServerConfig`], and hands that to the server.
//! Everything the handlers do is delegated to `fpt_core`.

pub mod server;

pub use server::{ServerConfig, create_router};
