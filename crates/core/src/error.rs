//! Error types for the media channel core
//!
//! Every precondition violation surfaces as an [`Error`]. Callers that need
//! the small-integer status of the C-style API use [`Error::status_code`] or
//! [`status_code`].

use thiserror::Error;

use crate::module::{ChannelStatus, ModuleId};

/// Result type alias for channel core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Status value returned for successful operations
pub const STATUS_OK: i32 = 0;

/// Error types that can occur in the channel core
#[derive(Debug, Error)]
pub enum Error {
    /// Channel index outside the module's table
    #[error("Invalid channel: {module}[{index}] (capacity {capacity})")]
    InvalidChannel {
        /// Module type of the table
        module: ModuleId,
        /// Requested index
        index: usize,
        /// Table capacity
        capacity: usize,
    },

    /// Missing or malformed attributes
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Slot already advanced past the state the operation requires
    #[error("Channel {module}[{index}] is busy (status {status})")]
    Busy {
        /// Module type
        module: ModuleId,
        /// Channel index
        index: usize,
        /// Status observed under the table lock
        status: ChannelStatus,
    },

    /// Channel already enabled
    #[error("Channel {module}[{index}] already exists (status {status})")]
    AlreadyExists {
        /// Module type
        module: ModuleId,
        /// Channel index
        index: usize,
        /// Status observed under the table lock
        status: ChannelStatus,
    },

    /// Enable attempted before attributes were set
    #[error("Channel {module}[{index}] is not configured")]
    NotConfigured {
        /// Module type
        module: ModuleId,
        /// Channel index
        index: usize,
    },

    /// Prerequisite state not reached
    #[error("Channel {module}[{index}] not ready: {reason}")]
    NotReady {
        /// Module type
        module: ModuleId,
        /// Channel index
        index: usize,
        /// What was missing
        reason: String,
    },

    /// Module type not handled by this operation
    #[error("Module {0} is not supported by this operation")]
    NotSupported(ModuleId),

    /// Flow engine failed to instantiate a flow
    #[error("Flow creation failed for factory '{factory}': {reason}")]
    FlowCreation {
        /// Factory name passed to the engine
        factory: String,
        /// Engine-supplied reason
        reason: String,
    },

    /// Flow engine rejected a connect/disconnect request
    #[error("Flow engine error: {0}")]
    Engine(String),

    /// Required pointer absent
    #[error("Null pointer: {0}")]
    NullPointer(&'static str),

    /// Buffer handle used after release
    #[error("Buffer handle already released")]
    BufferReleased,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Negative status code for the C-style result convention.
    ///
    /// | Error | Code |
    /// |-------|------|
    /// | `NullPointer` | -1 |
    /// | `NotReady` | -2 |
    /// | `Engine` | -3 |
    /// | `FlowCreation` | -4 |
    /// | `InvalidArgument`, `BufferReleased`, `Config`, `Io`, `Toml` | -5 |
    /// | `Busy` | -6 |
    /// | `NotSupported` | -7 |
    /// | `InvalidChannel` | -8 |
    /// | `AlreadyExists` | -10 |
    /// | `NotConfigured` | -11 |
    pub fn status_code(&self) -> i32 {
        match self {
            Error::NullPointer(_) => -1,
            Error::NotReady { .. } => -2,
            Error::Engine(_) => -3,
            Error::FlowCreation { .. } => -4,
            Error::InvalidArgument(_)
            | Error::BufferReleased
            | Error::Config(_)
            | Error::Io(_)
            | Error::Toml(_) => -5,
            Error::Busy { .. } => -6,
            Error::NotSupported(_) => -7,
            Error::InvalidChannel { .. } => -8,
            Error::AlreadyExists { .. } => -10,
            Error::NotConfigured { .. } => -11,
        }
    }

    pub(crate) fn not_ready(module: ModuleId, index: usize, reason: impl Into<String>) -> Self {
        Error::NotReady {
            module,
            index,
            reason: reason.into(),
        }
    }
}

/// Collapse an operation result to its integer status (0 on success)
pub fn status_code<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => STATUS_OK,
        Err(e) => e.status_code(),
    }
}
