use std::sync::Arc;
use std::time::{Duration, Instant};

use itrack_auth::{IdentityContext, JwtCredentialIssuer};
use itrack_core::PipelineError;
use itrack_pipeline::InternshipService;
use itrack_settings::ItrackSettings;
use itrack_store::{Database, ProfileRepo, RecordRepo, SqliteArtifactStore};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub identity: IdentityContext,
    pub service: Arc<InternshipService>,
    pub cookie_name: Arc<str>,
    pub start_time: Instant,
}

impl AppState {
    /// Wire the store, credential verifier and pipeline from settings.
    pub fn from_settings(settings: &ItrackSettings, db: &Database) -> Result<Self, PipelineError> {
        let issuer = Arc::new(JwtCredentialIssuer::new(
            &settings.auth.jwt_secret,
            &settings.auth.issuer,
            settings.auth.credential_ttl_secs,
        ));
        let directory = Arc::new(ProfileRepo::new(db.clone()));
        let identity = IdentityContext::new(
            issuer,
            directory.clone(),
            Duration::from_millis(settings.auth.verify_timeout_ms),
        );
        let service = InternshipService::new(
            RecordRepo::new(db.clone()),
            Arc::new(SqliteArtifactStore::new(db.clone())),
            directory,
            &settings.pipeline,
        )?;
        Ok(Self {
            identity,
            service: Arc::new(service),
            cookie_name: Arc::from(settings.auth.cookie_name.as_str()),
            start_time: Instant::now(),
        })
    }
}
