use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use itrack_core::ports::{CredentialIssuer, ProfileDirectory, ProfileKind};
use itrack_core::Principal;

use crate::errors::AuthError;

/// Resolves an inbound credential to a [`Principal`].
///
/// Roles come from the credential as issued. The principal's existence is
/// re-checked against the directory on every call, and department/site
/// fall back to the directory when the credential does not carry them.
#[derive(Clone)]
pub struct IdentityContext {
    issuer: Arc<dyn CredentialIssuer>,
    directory: Arc<dyn ProfileDirectory>,
    timeout: Duration,
}

impl IdentityContext {
    pub fn new(
        issuer: Arc<dyn CredentialIssuer>,
        directory: Arc<dyn ProfileDirectory>,
        timeout: Duration,
    ) -> Self {
        Self {
            issuer,
            directory,
            timeout,
        }
    }

    /// Authenticate a raw credential. Any failure, including running out
    /// of time, denies.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<Principal, AuthError> {
        let token = credential
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::InvalidCredential("credential missing".into()))?;

        match tokio::time::timeout(self.timeout, self.resolve(token)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.timeout, "credential verification timed out");
                Err(AuthError::Timeout)
            }
        }
    }

    async fn resolve(&self, token: &str) -> Result<Principal, AuthError> {
        let cred = self
            .issuer
            .verify(token)
            .await
            .map_err(|e| AuthError::InvalidCredential(e.to_string()))?;

        if cred.roles.is_empty() {
            return Err(AuthError::InvalidCredential("credential carries no roles".into()));
        }

        let profile = self
            .directory
            .get(&cred.principal_id)
            .await
            .map_err(|e| AuthError::Directory(e.to_string()))?
            .ok_or_else(|| AuthError::PrincipalNotFound(cred.principal_id.clone()))?;

        // A student credential must resolve to a student profile and a
        // staff credential to a staff profile.
        let is_student = cred.roles.contains(&itrack_core::Role::Student);
        let expected = if is_student {
            ProfileKind::Student
        } else {
            ProfileKind::Staff
        };
        if profile.kind != expected {
            return Err(AuthError::PrincipalNotFound(cred.principal_id));
        }

        let principal = Principal::new(
            cred.principal_id,
            cred.roles,
            cred.department.or(profile.department),
            cred.site.or(profile.site),
        );
        debug!(principal_id = %principal.id, roles = ?principal.roles, "authenticated");
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use itrack_core::ids::PrincipalId;
    use itrack_core::ports::Profile;
    use itrack_core::{PipelineError, Role, Site};
    use std::collections::HashMap;

    use crate::credential::JwtCredentialIssuer;

    #[derive(Default)]
    struct Directory {
        profiles: HashMap<String, Profile>,
        delay: Option<Duration>,
        fail: bool,
    }

    impl Directory {
        fn with(mut self, id: &str, kind: ProfileKind, department: Option<&str>, site: Option<Site>) -> Self {
            let _ = self.profiles.insert(
                id.to_string(),
                Profile {
                    id: PrincipalId::from_raw(id),
                    kind,
                    name: id.to_uppercase(),
                    department: department.map(Into::into),
                    site,
                    mentor_id: None,
                },
            );
            self
        }
    }

    #[async_trait]
    impl ProfileDirectory for Directory {
        async fn get(&self, id: &PrincipalId) -> Result<Option<Profile>, PipelineError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(PipelineError::Storage("directory offline".into()));
            }
            Ok(self.profiles.get(id.as_str()).cloned())
        }
    }

    fn jwt() -> Arc<JwtCredentialIssuer> {
        Arc::new(JwtCredentialIssuer::new("test-secret", "itrack", 3600))
    }

    fn context(issuer: Arc<JwtCredentialIssuer>, directory: Directory) -> IdentityContext {
        IdentityContext::new(issuer, Arc::new(directory), Duration::from_secs(2))
    }

    fn principal(id: &str, roles: &[Role], department: Option<&str>, site: Option<Site>) -> Principal {
        Principal::new(
            PrincipalId::from_raw(id),
            roles.iter().copied(),
            department.map(Into::into),
            site,
        )
    }

    #[tokio::test]
    async fn missing_credential_rejected() {
        let ctx = context(jwt(), Directory::default());
        assert_matches!(ctx.authenticate(None).await, Err(AuthError::InvalidCredential(_)));
        assert_matches!(ctx.authenticate(Some("  ")).await, Err(AuthError::InvalidCredential(_)));
    }

    #[tokio::test]
    async fn staff_principal_resolved_with_embedded_roles() {
        let jwt = jwt();
        let token = jwt
            .issue(&principal("h1", &[Role::Hod], Some("cse"), Some(Site::Sec)))
            .unwrap();
        let ctx = context(jwt, Directory::default().with("h1", ProfileKind::Staff, Some("ece"), Some(Site::Sit)));

        let p = ctx.authenticate(Some(token.as_str())).await.unwrap();
        assert!(p.has_role(Role::Hod));
        // Credential attributes win over the directory.
        assert_eq!(p.department.as_deref(), Some("cse"));
        assert_eq!(p.site, Some(Site::Sec));
    }

    #[tokio::test]
    async fn directory_fills_missing_attributes() {
        let jwt = jwt();
        let token = jwt.issue(&principal("p1", &[Role::Principal], None, None)).unwrap();
        let ctx = context(jwt, Directory::default().with("p1", ProfileKind::Staff, None, Some(Site::Sit)));

        let p = ctx.authenticate(Some(token.as_str())).await.unwrap();
        assert_eq!(p.site, Some(Site::Sit));
    }

    #[tokio::test]
    async fn vanished_principal_rejected() {
        let jwt = jwt();
        let token = jwt.issue(&principal("gone", &[Role::Ceo], None, None)).unwrap();
        let ctx = context(jwt, Directory::default());
        assert_matches!(
            ctx.authenticate(Some(token.as_str())).await,
            Err(AuthError::PrincipalNotFound(id)) if id.as_str() == "gone"
        );
    }

    #[tokio::test]
    async fn student_credential_needs_student_profile() {
        let jwt = jwt();
        let token = jwt.issue(&principal("x1", &[Role::Student], None, None)).unwrap();
        let ctx = context(jwt, Directory::default().with("x1", ProfileKind::Staff, None, None));
        assert_matches!(
            ctx.authenticate(Some(token.as_str())).await,
            Err(AuthError::PrincipalNotFound(_))
        );
    }

    #[tokio::test]
    async fn directory_fault_fails_closed() {
        let jwt = jwt();
        let token = jwt.issue(&principal("c1", &[Role::Ceo], None, None)).unwrap();
        let ctx = context(
            jwt,
            Directory {
                fail: true,
                ..Directory::default()
            },
        );
        let err = ctx.authenticate(Some(token.as_str())).await.unwrap_err();
        assert_matches!(err, AuthError::Directory(_));
        let mapped: PipelineError = err.into();
        assert_matches!(mapped, PipelineError::Authentication(_));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_directory_times_out() {
        let jwt = jwt();
        let token = jwt.issue(&principal("c1", &[Role::Ceo], None, None)).unwrap();
        let ctx = context(
            jwt,
            Directory {
                delay: Some(Duration::from_secs(30)),
                ..Directory::default().with("c1", ProfileKind::Staff, None, None)
            },
        );
        assert_matches!(ctx.authenticate(Some(token.as_str())).await, Err(AuthError::Timeout));
    }
}
