//! Service error taxonomy
//!
//! Errors map one-to-one onto gRPC-style status codes so any transport can
//! frame them without inspecting messages.

use crate::resource::NameError;
use datagate_engine::EngineError;
use datagate_storage::StorageError;
use thiserror::Error;

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced by the service layer
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Status code label for transport framing.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::FailedPrecondition(_) => "FAILED_PRECONDITION",
            Self::NotFound(_) => "NOT_FOUND",
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl From<NameError> for ServiceError {
    fn from(err: NameError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => Self::NotFound(msg),
            StorageError::Conflict(msg) => Self::AlreadyExists(msg),
            StorageError::InvalidInput(msg) => Self::InvalidArgument(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<EngineError> for ServiceError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            EngineError::NotFound(msg) => Self::NotFound(msg),
            EngineError::Unauthorized { .. } => Self::PermissionDenied(err.to_string()),
            EngineError::FlowDisabled(_)
            | EngineError::EmptyFlow(_)
            | EngineError::DuplicateActive(_)
            | EngineError::NotActive(_)
            | EngineError::NotCurrentPosition { .. }
            | EngineError::DuplicateDecision { .. }
            | EngineError::NoFlowConfigured(_) => Self::FailedPrecondition(err.to_string()),
            EngineError::Storage(storage) => storage.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}
