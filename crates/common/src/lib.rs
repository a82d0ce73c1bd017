//! Common utilities for temper binaries
//!
//! Logging setup and the shared error type used by tools built on the
//! `temper` crate.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::{LOG_LEVELS, setup_logging, validate_log_level};
