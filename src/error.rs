//! Error types for the synthesis bridge.
//!
//! This module defines error codes and the main error type used throughout
//! the bridge. Synthesis tool diagnostics never reach callers through these
//! types; a failed synthesis resolves as an absent output instead.

use crate::config::ConfigError;
use crate::extract::ExtractError;
use crate::tool::ToolError;
use serde::{Deserialize, Serialize};

/// Error codes for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The worker failed to initialize or has stopped
    WorkerUnavailable,
    /// The bridge dropped a pending request before it was answered
    ResponseDropped,
    /// The bridge has been shut down
    Shutdown,
    /// Invalid bridge configuration
    InvalidConfig,
    /// The synthesis tool could not be loaded or run
    ToolFailure,
    /// Filesystem or process IO error
    IoError,
    /// Serialization/deserialization error
    SerializationError,
    /// An e-graph could not be read or extracted
    ExtractionFailed,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::WorkerUnavailable => write!(f, "WORKER_UNAVAILABLE"),
            ErrorCode::ResponseDropped => write!(f, "RESPONSE_DROPPED"),
            ErrorCode::Shutdown => write!(f, "SHUTDOWN"),
            ErrorCode::InvalidConfig => write!(f, "INVALID_CONFIG"),
            ErrorCode::ToolFailure => write!(f, "TOOL_FAILURE"),
            ErrorCode::IoError => write!(f, "IO_ERROR"),
            ErrorCode::SerializationError => write!(f, "SERIALIZATION_ERROR"),
            ErrorCode::ExtractionFailed => write!(f, "EXTRACTION_FAILED"),
        }
    }
}

/// Main error type for the bridge
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The worker cannot service requests
    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// A pending request was dropped without a reply
    #[error("Response dropped for request {0}")]
    ResponseDropped(String),

    /// The bridge has been shut down
    #[error("Bridge is shut down")]
    Shutdown,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Synthesis tool error
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// E-graph extraction error
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractError),
}

impl BridgeError {
    /// Error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::WorkerUnavailable(_) => ErrorCode::WorkerUnavailable,
            BridgeError::ResponseDropped(_) => ErrorCode::ResponseDropped,
            BridgeError::Shutdown => ErrorCode::Shutdown,
            BridgeError::Config(_) => ErrorCode::InvalidConfig,
            BridgeError::Tool(_) => ErrorCode::ToolFailure,
            BridgeError::Io(_) => ErrorCode::IoError,
            BridgeError::Serialization(_) => ErrorCode::SerializationError,
            BridgeError::Extraction(_) => ErrorCode::ExtractionFailed,
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Serialization(e.to_string())
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
