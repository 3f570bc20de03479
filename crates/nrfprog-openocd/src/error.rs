//! Error types for OpenOCD operations

use nrfprog_core::error::{Error as CoreError, ProbeFailure};
use thiserror::Error;

/// OpenOCD-specific errors
#[derive(Debug, Error)]
pub enum OpenOcdError {
    /// Failed to reach the TCL server
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The transport is not open
    #[error("Not connected to the OpenOCD server")]
    NotConnected,

    /// The server closed the connection
    #[error("Connection closed by the OpenOCD server")]
    Disconnected,

    /// A command returned a non-zero status
    #[error("Command `{command}` failed: {message}")]
    CommandFailed {
        /// Command as sent, without the status wrapper
        command: String,
        /// Error text returned by OpenOCD
        message: String,
    },

    /// A reply could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// I/O error during communication
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for OpenOCD operations
pub type Result<T> = core::result::Result<T, OpenOcdError>;

/// Log the detail and map to the core probe failure `kind`
pub(crate) fn to_core(err: OpenOcdError, kind: ProbeFailure) -> CoreError {
    log::error!("OpenOCD: {}", err);
    kind.into()
}
