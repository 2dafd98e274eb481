use itrack_core::{ConflictKind, PipelineError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("stale version: expected {expected}, found {actual}")]
    Stale { expected: i64, actual: i64 },

    #[error("record limit of {0} reached")]
    LimitReached(u32),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        table: &'static str,
        column: &'static str,
        detail: String,
    },

    #[error("IO error: {0}")]
    Io(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => PipelineError::NotFound(format!("{what} not found")),
            StoreError::Stale { expected, actual } => PipelineError::stale(expected, actual),
            StoreError::LimitReached(limit) => {
                PipelineError::StateConflict(ConflictKind::LimitReached { limit })
            }
            StoreError::Conflict(msg) => PipelineError::Internal(msg),
            other => PipelineError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn stale_maps_to_stale_state() {
        let err: PipelineError = StoreError::Stale {
            expected: 3,
            actual: 4,
        }
        .into();
        assert!(err.is_stale());
    }

    #[test]
    fn not_found_keeps_subject() {
        let err: PipelineError = StoreError::NotFound("record intern_1".into()).into();
        assert_matches!(err, PipelineError::NotFound(msg) if msg == "record intern_1 not found");
    }

    #[test]
    fn database_errors_become_storage() {
        let err: PipelineError = StoreError::Database("disk I/O error".into()).into();
        assert_matches!(err, PipelineError::Storage(_));
        assert_eq!(err.public_message(), "Internal error");
    }

    #[test]
    fn limit_maps_to_conflict() {
        let err: PipelineError = StoreError::LimitReached(2).into();
        assert_matches!(
            err,
            PipelineError::StateConflict(ConflictKind::LimitReached { limit: 2 })
        );
    }
}
