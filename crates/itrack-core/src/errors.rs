//! Error taxonomy shared by every layer above the store.

use std::fmt;

/// Machine-readable codes carried in failure responses.
pub const AUTHENTICATION_REQUIRED: &str = "AUTHENTICATION_REQUIRED";
pub const NOT_AUTHORIZED: &str = "NOT_AUTHORIZED";
pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
pub const STATE_CONFLICT: &str = "STATE_CONFLICT";
pub const STALE_STATE: &str = "STALE_STATE";
pub const NOT_FOUND: &str = "NOT_FOUND";
pub const STORAGE_FAILURE: &str = "STORAGE_FAILURE";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Why a state-changing request conflicted with the record's state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConflictKind {
    /// The record is `completed`, `rejected` or `completion_verified`.
    AlreadyTerminal,
    /// The record changed since the caller read it.
    StaleState { expected: i64, actual: i64 },
    /// The action is not valid from the record's current status.
    WrongState { expected: String, actual: String },
    /// The student already holds the maximum number of records.
    LimitReached { limit: u32 },
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyTerminal => f.write_str("record is already in a terminal state"),
            Self::StaleState { .. } => {
                f.write_str("record was modified by someone else; reload and retry")
            }
            Self::WrongState { expected, actual } => {
                write!(f, "record must be {expected}, but is {actual}")
            }
            Self::LimitReached { limit } => {
                write!(f, "a student may hold at most {limit} internship records")
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    StateConflict(ConflictKind),

    #[error("{0}")]
    NotFound(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authentication(_) => AUTHENTICATION_REQUIRED,
            Self::Authorization(_) => NOT_AUTHORIZED,
            Self::Validation(_) => VALIDATION_FAILED,
            Self::StateConflict(ConflictKind::StaleState { .. }) => STALE_STATE,
            Self::StateConflict(_) => STATE_CONFLICT,
            Self::NotFound(_) => NOT_FOUND,
            Self::Storage(_) => STORAGE_FAILURE,
            Self::Internal(_) => INTERNAL_ERROR,
        }
    }

    /// Message safe to show a caller.
    ///
    /// Authentication and authorization failures collapse to fixed texts
    /// so the caller learns neither whether a principal exists nor which
    /// role was expected. Storage and internal faults hide their detail.
    pub fn public_message(&self) -> String {
        match self {
            Self::Authentication(_) => "Log in first".into(),
            Self::Authorization(_) => "You are not authorized to perform this action".into(),
            Self::Storage(_) | Self::Internal(_) => "Internal error".into(),
            Self::Validation(msg) | Self::NotFound(msg) => msg.clone(),
            Self::StateConflict(kind) => kind.to_string(),
        }
    }

    pub fn stale(expected: i64, actual: i64) -> Self {
        Self::StateConflict(ConflictKind::StaleState { expected, actual })
    }

    pub fn wrong_state(expected: impl Into<String>, actual: impl fmt::Display) -> Self {
        Self::StateConflict(ConflictKind::WrongState {
            expected: expected.into(),
            actual: actual.to_string(),
        })
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StateConflict(ConflictKind::StaleState { .. }))
    }
}
