//! Approval pipeline settings.

use std::collections::BTreeMap;

use itrack_core::{ApprovalChain, Role, Site};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    /// Approval chain per site, in escalation order.
    pub chains: BTreeMap<Site, Vec<Role>>,
    /// Role that verifies completion certificates.
    pub completion_verifier: Role,
    /// Non-rejected records a single student may hold.
    pub max_records_per_student: u32,
    pub max_artifact_bytes: usize,
    pub allowed_artifact_types: Vec<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let chain: Vec<Role> = ApprovalChain::default().into();
        Self {
            chains: BTreeMap::from([(Site::Sec, chain.clone()), (Site::Sit, chain)]),
            completion_verifier: Role::Mentor,
            max_records_per_student: 2,
            max_artifact_bytes: 1_048_576,
            allowed_artifact_types: vec![
                "application/pdf".to_string(),
                "image/png".to_string(),
                "image/jpeg".to_string(),
            ],
        }
    }
}

impl PipelineSettings {
    /// Build validated chains for every site.
    pub fn approval_chains(&self) -> Result<BTreeMap<Site, ApprovalChain>> {
        let mut out = BTreeMap::new();
        for site in [Site::Sec, Site::Sit] {
            let roles = self.chains.get(&site).ok_or_else(|| {
                SettingsError::InvalidValue(format!("pipeline.chains.{site}: missing"))
            })?;
            let chain = ApprovalChain::new(roles.clone()).map_err(|e| {
                SettingsError::InvalidValue(format!("pipeline.chains.{site}: {e}"))
            })?;
            let _ = out.insert(site, chain);
        }
        Ok(out)
    }

    pub fn validate(&self) -> Result<()> {
        let _ = self.approval_chains()?;
        if !matches!(
            self.completion_verifier,
            Role::Mentor | Role::InternshipCoordinator | Role::Hod
        ) {
            return Err(SettingsError::InvalidValue(format!(
                "pipeline.completionVerifier: {} is outside the mentor/hod tier",
                self.completion_verifier
            )));
        }
        if self.max_records_per_student == 0 {
            return Err(SettingsError::InvalidValue(
                "pipeline.maxRecordsPerStudent must be at least 1".into(),
            ));
        }
        if self.allowed_artifact_types.is_empty() {
            return Err(SettingsError::InvalidValue(
                "pipeline.allowedArtifactTypes must not be empty".into(),
            ));
        }
        Ok(())
    }
}
