//! Error types for the driver crate.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use zigate_protocol::{Message, ProtocolError};

use crate::driver::ConnectionState;
use crate::queue::Drained;
use crate::waiter::WaitError;

/// Why a single command did not produce a result.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The request could not be built (unknown command, bad payload).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// No transport session is open.
    #[error("driver is not open")]
    NotOpen,

    /// The command queue was drained before the command started.
    #[error("command queue drained")]
    Drained,

    /// Writing the frame failed.
    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    /// An expectation's deadline elapsed.
    #[error("{description}")]
    Timeout {
        /// What was being waited for.
        description: String,
        /// Configured deadline.
        timeout: Duration,
    },

    /// An expectation was removed before it settled.
    #[error("expectation cancelled")]
    Cancelled,

    /// The command completed without producing a message.
    #[error("command completed without a response")]
    NoResponse,

    /// The coordinator rejected the command.
    #[error("coordinator rejected command with status 0x{status:02X}")]
    Status {
        /// Raw status code.
        status: u8,
        /// The status confirmation itself.
        message: Message,
    },
}

impl From<WaitError> for CommandError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Timeout {
                description,
                timeout,
            } => CommandError::Timeout {
                description,
                timeout,
            },
            WaitError::Cancelled => CommandError::Cancelled,
        }
    }
}

impl From<Drained> for CommandError {
    fn from(_: Drained) -> Self {
        CommandError::Drained
    }
}

/// Errors reading a driver configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the file failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The YAML was malformed.
    #[error("invalid configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// No coordinator address was configured.
    #[error("no coordinator address configured")]
    MissingAddress,

    /// The serial line speed is unusable.
    #[error("invalid baud rate {0}")]
    InvalidBaudRate(u32),
}

/// Errors surfaced by [`Driver`](crate::Driver).
#[derive(Debug, Error)]
pub enum DriverError {
    /// The transport could not be established.
    #[error("failed to open {address}: {source}")]
    Open {
        /// Address that was opened.
        address: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The operation is not allowed in the current connection state.
    #[error("operation not allowed while {0:?}")]
    InvalidState(ConnectionState),

    /// A command failed.
    #[error("command {name} (0x{code:04X}) failed: {source}")]
    Command {
        /// Command code.
        code: u16,
        /// Command name, or `"unknown"` when the code is not in the catalog.
        name: &'static str,
        /// What went wrong.
        #[source]
        source: CommandError,
    },

    /// Releasing the transport failed.
    #[error("close failed: {0}")]
    Close(#[source] io::Error),

    /// The configuration was unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DriverError {
    /// The command-level cause, if this is a command failure.
    pub fn command_error(&self) -> Option<&CommandError> {
        match self {
            DriverError::Command { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether a command failed because an expectation timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self.command_error(), Some(CommandError::Timeout { .. }))
    }

    /// The rejecting status confirmation, if the coordinator refused the command.
    pub fn rejected_status(&self) -> Option<&Message> {
        match self.command_error() {
            Some(CommandError::Status { message, .. }) => Some(message),
            _ => None,
        }
    }
}

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;
