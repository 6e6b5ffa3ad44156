//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while parsing client lines.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid role token: {0:?}")]
    InvalidRole(String),

    #[error("Admin login requires a user and a password")]
    MissingCredentials,

    #[error("Unknown command: {0:?}")]
    UnknownCommand(String),

    #[error("Malformed telemetry frame: {0}")]
    MalformedTelemetry(String),
}
