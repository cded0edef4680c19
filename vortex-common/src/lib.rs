//! # vortex Common
//!
//! Shared utilities for the vortex components.
//!
//! ## Logging
//!
//! ```rust,ignore
//! use vortex_common::{init_logging, LogFormat};
//!
//! init_logging("info").unwrap();
//! // or, for log aggregation pipelines:
//! vortex_common::init_logging_with_format("info", LogFormat::Json).unwrap();
//! ```

pub mod logging;

pub use logging::{init_logging, init_logging_json, init_logging_with_format, LogFormat};
