//! Auth error types.

use itrack_core::ids::PrincipalId;
use itrack_core::PipelineError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Missing, malformed, expired or badly signed credential.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// The credential names a principal the directory no longer holds.
    #[error("principal not found: {0}")]
    PrincipalNotFound(PrincipalId),

    /// Verification did not finish within the configured budget.
    #[error("credential verification timed out")]
    Timeout,

    /// The profile directory could not be consulted.
    #[error("profile directory unavailable: {0}")]
    Directory(String),

    /// Issuing a credential failed.
    #[error("failed to sign credential: {0}")]
    Signing(String),
}

impl From<AuthError> for PipelineError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Signing(msg) => PipelineError::Internal(msg),
            other => PipelineError::Authentication(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn verification_failures_become_authentication() {
        for err in [
            AuthError::InvalidCredential("bad signature".into()),
            AuthError::PrincipalNotFound(PrincipalId::from_raw("usr_1")),
            AuthError::Timeout,
            AuthError::Directory("db locked".into()),
        ] {
            let mapped: PipelineError = err.into();
            assert_matches!(mapped, PipelineError::Authentication(_));
            assert_eq!(mapped.public_message(), "Log in first");
        }
    }

    #[test]
    fn signing_failure_is_internal() {
        let mapped: PipelineError = AuthError::Signing("key".into()).into();
        assert_matches!(mapped, PipelineError::Internal(_));
    }
}
