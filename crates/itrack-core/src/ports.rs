//! Collaborator interfaces consumed by the identity and pipeline layers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;
use crate::ids::{ArtifactId, PrincipalId};
use crate::roles::{Role, Site};

/// Claims extracted from a credential whose signature and expiry held.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedCredential {
    pub principal_id: PrincipalId,
    pub roles: Vec<Role>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub department: Option<String>,
    pub site: Option<Site>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential missing")]
    Missing,
    #[error("credential expired")]
    Expired,
    #[error("credential invalid: {0}")]
    Invalid(String),
}

#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedCredential, CredentialError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    Student,
    Staff,
}

/// Organizational attributes of a principal as held by the directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: PrincipalId,
    pub kind: ProfileKind,
    pub name: String,
    pub department: Option<String>,
    pub site: Option<Site>,
    /// Assigned mentor, students only.
    pub mentor_id: Option<PrincipalId>,
}

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn get(&self, id: &PrincipalId) -> Result<Option<Profile>, PipelineError>;
}

/// A stored document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub id: ArtifactId,
    pub mime_type: String,
    pub logical_name: String,
    pub bytes: Vec<u8>,
}

/// Opaque document storage. Content is never inspected.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn save(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        logical_name: &str,
    ) -> Result<ArtifactId, PipelineError>;

    async fn load(&self, id: &ArtifactId) -> Result<Option<Artifact>, PipelineError>;

    async fn delete(&self, id: &ArtifactId) -> Result<(), PipelineError>;
}
