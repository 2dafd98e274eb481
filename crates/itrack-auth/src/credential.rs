//! HS256 JWT credentials.
//!
//! Roles and organizational attributes are embedded at issuance and are
//! taken as-is on verification until the credential expires.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use itrack_core::ids::PrincipalId;
use itrack_core::ports::{CredentialError, CredentialIssuer, VerifiedCredential};
use itrack_core::{Principal, Role, Site};

use crate::errors::AuthError;

/// Upper bound on credential lifetime.
const MAX_TTL_SECS: u64 = 366 * 24 * 3600;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    roles: Vec<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dept: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    site: Option<Site>,
    iss: String,
    iat: i64,
    exp: i64,
}

pub struct JwtCredentialIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl: Duration,
}

impl JwtCredentialIssuer {
    pub fn new(secret: &str, issuer: &str, ttl_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: issuer.to_string(),
            ttl: Duration::seconds(i64::try_from(ttl_secs.min(MAX_TTL_SECS)).unwrap_or(0)),
        }
    }

    /// Mint a credential for `principal`, valid from now for the configured TTL.
    pub fn issue(&self, principal: &Principal) -> Result<String, AuthError> {
        self.issue_at(principal, Utc::now())
    }

    /// Mint a credential as if issued at `issued_at`.
    pub fn issue_at(
        &self,
        principal: &Principal,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            sub: principal.id.as_str().to_string(),
            roles: principal.roles.iter().copied().collect(),
            dept: principal.department.clone(),
            site: principal.site,
            iss: self.issuer.clone(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

#[async_trait]
impl CredentialIssuer for JwtCredentialIssuer {
    async fn verify(&self, token: &str) -> Result<VerifiedCredential, CredentialError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => CredentialError::Expired,
                _ => CredentialError::Invalid(e.to_string()),
            })?;
        let claims = data.claims;

        let timestamp = |secs: i64| {
            DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| CredentialError::Invalid(format!("timestamp out of range: {secs}")))
        };

        Ok(VerifiedCredential {
            principal_id: PrincipalId::from_raw(claims.sub),
            roles: claims.roles,
            issued_at: timestamp(claims.iat)?,
            expires_at: timestamp(claims.exp)?,
            department: claims.dept,
            site: claims.site,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn hod() -> Principal {
        Principal::new(
            PrincipalId::from_raw("h1"),
            [Role::Hod, Role::Mentor],
            Some("cse".into()),
            Some(Site::Sec),
        )
    }

    #[tokio::test]
    async fn issue_then_verify() {
        let issuer = JwtCredentialIssuer::new("secret", "itrack", 3600);
        let token = issuer.issue(&hod()).unwrap();

        let cred = issuer.verify(&token).await.unwrap();
        assert_eq!(cred.principal_id.as_str(), "h1");
        assert_eq!(cred.roles, vec![Role::Mentor, Role::Hod]);
        assert_eq!(cred.department.as_deref(), Some("cse"));
        assert_eq!(cred.site, Some(Site::Sec));
        assert_eq!((cred.expires_at - cred.issued_at).num_seconds(), 3600);
    }

    #[tokio::test]
    async fn expired_credential_rejected() {
        let issuer = JwtCredentialIssuer::new("secret", "itrack", 60);
        let token = issuer
            .issue_at(&hod(), Utc::now() - Duration::hours(2))
            .unwrap();
        assert_matches!(issuer.verify(&token).await, Err(CredentialError::Expired));
    }

    #[tokio::test]
    async fn wrong_secret_rejected() {
        let token = JwtCredentialIssuer::new("secret-a", "itrack", 3600)
            .issue(&hod())
            .unwrap();
        let other = JwtCredentialIssuer::new("secret-b", "itrack", 3600);
        assert_matches!(other.verify(&token).await, Err(CredentialError::Invalid(_)));
    }

    #[tokio::test]
    async fn wrong_issuer_rejected() {
        let token = JwtCredentialIssuer::new("secret", "someone-else", 3600)
            .issue(&hod())
            .unwrap();
        let ours = JwtCredentialIssuer::new("secret", "itrack", 3600);
        assert_matches!(ours.verify(&token).await, Err(CredentialError::Invalid(_)));
    }

    #[tokio::test]
    async fn garbage_rejected() {
        let issuer = JwtCredentialIssuer::new("secret", "itrack", 3600);
        assert_matches!(
            issuer.verify("not.a.jwt").await,
            Err(CredentialError::Invalid(_))
        );
    }
}
