//! Error types for the engine layer

use datagate_types::{ExecutionId, FlowId, IssueId, SensitivityLevel, UserId};
use thiserror::Error;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by classification, selection, and execution
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("flow {0} is disabled")]
    FlowDisabled(FlowId),

    #[error("flow {0} has no nodes")]
    EmptyFlow(FlowId),

    #[error("issue {0} already has an active execution")]
    DuplicateActive(IssueId),

    #[error("execution {0} is not active")]
    NotActive(ExecutionId),

    #[error("position {position} is not the current position of execution {execution_id}")]
    NotCurrentPosition {
        execution_id: ExecutionId,
        position: u32,
    },

    #[error("user {user} already recorded a decision at position {position}")]
    DuplicateDecision { user: UserId, position: u32 },

    #[error("user {user} is not authorized to decide at position {position}")]
    Unauthorized { user: UserId, position: u32 },

    #[error("no enabled approval flow is configured for level {0}")]
    NoFlowConfigured(SensitivityLevel),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("change extraction failed: {0}")]
    Extractor(String),

    #[error("authority resolution failed: {0}")]
    Authority(String),

    #[error("storage error: {0}")]
    Storage(#[from] datagate_storage::StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}
