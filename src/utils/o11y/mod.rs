//! Common observability utilities.
//!
//! This module provides the tracing subscriber and the error-logging helpers
//! used throughout the pipeline.
//!
pub mod logging;

pub use logging::{as_error, log_error};
