//! Error types shared by the tree, the drivers and the command protocol
//!
//! Every error carries a TR-069 style fault code so the command socket can
//! render it as `ERROR <code> <message>` without knowing where it came from.

use thiserror::Error;

/// Fault: method not supported
pub const FAULT_METHOD_NOT_SUPPORTED: u32 = 9000;
/// Fault: internal error
pub const FAULT_INTERNAL_ERROR: u32 = 9002;
/// Fault: invalid arguments
pub const FAULT_INVALID_ARGUMENTS: u32 = 9003;
/// Fault: invalid parameter name
pub const FAULT_INVALID_PARAMETER_NAME: u32 = 9005;
/// Fault: invalid parameter value
pub const FAULT_INVALID_PARAMETER_VALUE: u32 = 9007;
/// Fault: attempt to set a non-writable parameter
pub const FAULT_NON_WRITABLE_PARAMETER: u32 = 9008;
/// Fault: download failure
pub const FAULT_DOWNLOAD_FAILURE: u32 = 9010;

/// Result alias used across the library
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Library error
#[derive(Debug, Error)]
pub enum Error {
    /// A value was rejected by a parameter validator at set time
    #[error("{name}: invalid value {value:?}: {reason}")]
    Validation {
        name: String,
        value: String,
        reason: String,
    },

    /// Write attempted on a read-only parameter
    #[error("{0} is read-only")]
    ReadOnly(String),

    /// Path does not name a parameter or object
    #[error("no such parameter or object: {0}")]
    NotFound(String),

    /// Operation not allowed in the current state
    #[error("{0}")]
    InvalidState(String),

    /// Tree structure does not match its schema
    #[error("{path}: {reason}")]
    Schema { path: String, reason: String },

    /// Unknown or malformed command
    #[error("{0}")]
    Dispatch(String),

    /// Unknown command name
    #[error("no such command {0:?}")]
    UnknownCommand(String),

    /// The control surface rejected an operation
    #[error("control surface operation {op:?} failed: {reason}")]
    ControlSurface { op: String, reason: String },

    /// Malformed quoting on the wire
    #[error("framing error: {0}")]
    Framing(String),

    /// Download request rejected
    #[error("download rejected: {0}")]
    Download(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(
        name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a control surface error
    pub fn control_surface(op: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ControlSurface {
            op: op.into(),
            reason: reason.into(),
        }
    }

    /// Create a schema error
    pub fn schema(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Fault code reported on the command socket
    pub fn code(&self) -> u32 {
        match self {
            Error::Validation { .. } => FAULT_INVALID_PARAMETER_VALUE,
            Error::ReadOnly(_) => FAULT_NON_WRITABLE_PARAMETER,
            Error::NotFound(_) => FAULT_INVALID_PARAMETER_NAME,
            Error::UnknownCommand(_) => FAULT_METHOD_NOT_SUPPORTED,
            Error::Dispatch(_) | Error::Framing(_) => FAULT_INVALID_ARGUMENTS,
            Error::Download(_) => FAULT_DOWNLOAD_FAILURE,
            Error::InvalidState(_)
            | Error::Schema { .. }
            | Error::ControlSurface { .. }
            | Error::Io(_) => FAULT_INTERNAL_ERROR,
        }
    }

    /// Whether the connection must be closed after reporting this error
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Error::Framing(_))
    }
}
