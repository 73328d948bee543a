//! Common utilities for docbridge
//!
//! This crate provides the error type and message sanitization shared by the
//! facade crate and the CLI host.

pub mod error;
pub mod sanitize;

pub use error::{DocBridgeError, Result};
pub use sanitize::{categorize_error, sanitize_error, ErrorCategory};
