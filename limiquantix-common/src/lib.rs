//! # limiquantix Common
//!
//! Shared utilities for the limiquantix network daemon.
//!
//! ## Logging
//!
//! ```rust,ignore
//! use limiquantix_common::init_logging;
//!
//! // RUST_LOG takes precedence over the level given here
//! init_logging("info").unwrap();
//! tracing::info!(network = "net1", "Network created");
//! ```

pub mod logging;

pub use logging::{init_logging, init_logging_json, LogFormat};
