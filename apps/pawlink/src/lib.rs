//! # pawlink
//!
//! HTTP server and CLI around `pawlink-core`. The binary in `main.rs` is a
//! thin entry point; everything it runs lives here so integration tests can
//! drive the router directly.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
