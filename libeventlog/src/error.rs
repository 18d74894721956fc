/*
 * Error types for the event logger
 *
 * Formatting and enqueueing never fail, so the only errors that reach a
 * caller come from configuration and from the file layer. Looking up an
 * unknown log name is not an error at all; those calls are no-ops.
 */

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by the event logger
#[derive(Error, Debug)]
pub enum LogError {
    /// Invalid name, directory or configuration file
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The day file could not be opened or created
    #[error("Failed to open log file '{}': {source}", .path.display())]
    FileOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A flush failed partway through writing the queued lines
    #[error("Failed to write log file '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, LogError>;
