//! Error types for loopcast
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Decode failures on individual progress lines are recoverable
//! and never surface through this type; everything here is either a startup
//! failure or an unrecoverable desynchronization.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for loopcast
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Media probe invocation or output parsing errors
    #[error("Probe error for {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    /// A file in the slots directory does not follow the prefix+index+extension convention
    #[error("Malformed slot filename: {0}")]
    SlotName(PathBuf),

    /// Elapsed-time token could not be decoded
    #[error("Progress decode error: {0}")]
    Decode(String),

    /// The playout process reported a timer earlier than one already seen
    #[error("Playout clock regressed by {0} ms")]
    ClockRegression(i64),

    /// Playout subprocess could not be spawned
    #[error("Playout spawn error: {0}")]
    Spawn(String),

    /// Deferred filler restore failed for a retiring slot
    #[error("Reset of slot {index} failed: {source}")]
    Reset {
        index: usize,
        source: std::io::Error,
    },

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using loopcast Error
pub type Result<T> = std::result::Result<T, Error>;
