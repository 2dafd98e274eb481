//! Request-level operations.
//!
//! Each operation takes the already authenticated [`Principal`], asks the
//! role authority, runs the pure transition and commits the result with an
//! optimistic version check. Artifacts are stored before a commit that
//! references them and removed again when that commit fails.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use itrack_auth::{Action, RoleAuthority, Target};
use itrack_core::ids::{ArtifactId, PrincipalId, RecordId};
use itrack_core::ports::{Artifact, ArtifactStore, ProfileDirectory, ProfileKind};
use itrack_core::{
    ConflictKind, Decision, InternshipDetails, InternshipRecord, Phase, PipelineError, Principal,
    RecordStatus, Role, ScopeFilter,
};
use itrack_settings::PipelineSettings;
use itrack_store::RecordRepo;

use crate::transition::{ApprovalPipeline, Submission};
use crate::upload::{Upload, UploadPolicy};

#[derive(Clone, Debug)]
pub struct SubmitRequest {
    pub details: InternshipDetails,
    pub offer_letter: Option<Upload>,
}

#[derive(Clone, Debug)]
pub struct AmendRequest {
    pub details: InternshipDetails,
    /// Replaces the current offer letter when present.
    pub offer_letter: Option<Upload>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    OfferLetter,
    Certificate,
}

/// Where a record stands, without its details.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStatus {
    pub record_id: RecordId,
    pub status: RecordStatus,
    pub phase: Phase,
    pub current_approver: Option<Role>,
    pub trail_length: usize,
    pub last_decision: Option<Decision>,
    pub version: i64,
}

impl From<&InternshipRecord> for ApprovalStatus {
    fn from(record: &InternshipRecord) -> Self {
        Self {
            record_id: record.id.clone(),
            status: record.status,
            phase: record.phase,
            current_approver: record.current_approver,
            trail_length: record.trail.len(),
            last_decision: record.last_entry().map(|e| e.decision),
            version: record.version,
        }
    }
}

pub struct InternshipService {
    records: RecordRepo,
    artifacts: Arc<dyn ArtifactStore>,
    directory: Arc<dyn ProfileDirectory>,
    pipeline: ApprovalPipeline,
    uploads: UploadPolicy,
    max_records_per_student: u32,
}

impl InternshipService {
    pub fn new(
        records: RecordRepo,
        artifacts: Arc<dyn ArtifactStore>,
        directory: Arc<dyn ProfileDirectory>,
        settings: &PipelineSettings,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            records,
            artifacts,
            directory,
            pipeline: ApprovalPipeline::from_settings(settings)?,
            uploads: UploadPolicy::from_settings(settings),
            max_records_per_student: settings.max_records_per_student,
        })
    }

    pub fn pipeline(&self) -> &ApprovalPipeline {
        &self.pipeline
    }

    fn authority(&self) -> &RoleAuthority {
        self.pipeline.authority()
    }

    fn authorize(
        &self,
        principal: &Principal,
        action: Action,
        target: Target<'_>,
    ) -> Result<(), PipelineError> {
        self.authority()
            .authorize(principal, action, target)
            .into_result()
            .inspect_err(|e| denied(principal, action, e))
    }

    /// Create a record for the calling student.
    #[instrument(skip_all, fields(actor_id = %principal.id, action = "submit"))]
    pub async fn submit(
        &self,
        principal: &Principal,
        request: SubmitRequest,
    ) -> Result<InternshipRecord, PipelineError> {
        self.authorize(principal, Action::Submit, Target::Owner(&principal.id))?;
        request
            .details
            .validate()
            .map_err(PipelineError::Validation)?;
        if let Some(upload) = &request.offer_letter {
            self.uploads.check(upload)?;
        }

        let profile = self
            .directory
            .get(&principal.id)
            .await?
            .filter(|p| p.kind == ProfileKind::Student)
            .ok_or_else(|| PipelineError::NotFound("student profile not found".into()))?;
        let department = profile
            .department
            .or_else(|| principal.department.clone())
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| PipelineError::Validation("student profile has no department".into()))?;
        let site = profile
            .site
            .or(principal.site)
            .ok_or_else(|| PipelineError::Validation("student profile has no site".into()))?;

        // Cheap early refusal; the authoritative check runs with the insert.
        let held = self.records.count_active_for_student(&principal.id)?;
        if held >= i64::from(self.max_records_per_student) {
            return Err(PipelineError::StateConflict(ConflictKind::LimitReached {
                limit: self.max_records_per_student,
            }));
        }

        let offer_letter = match request.offer_letter {
            Some(upload) => Some(self.store_upload(upload).await?),
            None => None,
        };

        let result = self
            .pipeline
            .open(Submission {
                student_id: principal.id.clone(),
                department,
                site,
                mentor_id: profile.mentor_id,
                details: request.details,
                offer_letter: offer_letter.clone(),
            })
            .and_then(|record| {
                self.records
                    .insert_within_limit(&record, self.max_records_per_student)
                    .map_err(PipelineError::from)
            });

        match result {
            Ok(record) => {
                info!(record_id = %record.id, approver = ?record.current_approver, "record submitted");
                Ok(record)
            }
            Err(e) => {
                if let Some(id) = offer_letter {
                    self.discard(&id).await;
                }
                Err(e)
            }
        }
    }

    #[instrument(skip_all, fields(actor_id = %principal.id, record_id = %id, action = "view"))]
    pub async fn view(
        &self,
        principal: &Principal,
        id: &RecordId,
    ) -> Result<InternshipRecord, PipelineError> {
        let record = self.records.fetch(id)?;
        self.authorize(principal, Action::View, Target::Record(&record))?;
        Ok(record)
    }

    /// Every record in the principal's scope, newest first.
    #[instrument(skip_all, fields(actor_id = %principal.id, action = "list"))]
    pub async fn list(&self, principal: &Principal) -> Result<Vec<InternshipRecord>, PipelineError> {
        self.authorize(principal, Action::List, Target::Collection)?;
        let filter = self.authority().scope_filter(principal);
        let records = self.records.fetch_many(&filter)?;
        debug!(count = records.len(), ?filter, "records listed");
        Ok(records)
    }

    /// One student's records. Staff only see them when the student is in
    /// their scope.
    #[instrument(skip_all, fields(actor_id = %principal.id, student_id = %student_id, action = "list"))]
    pub async fn list_for_student(
        &self,
        principal: &Principal,
        student_id: &PrincipalId,
    ) -> Result<Vec<InternshipRecord>, PipelineError> {
        self.authorize(principal, Action::List, Target::Owner(student_id))?;
        let filter = if principal.id == *student_id {
            ScopeFilter::Owner {
                student_id: student_id.clone(),
            }
        } else {
            self.authority().scope_filter(principal)
        };
        Ok(self.records.fetch_for_student(student_id, &filter)?)
    }

    #[instrument(skip_all, fields(actor_id = %principal.id, record_id = %id, action = "approve"))]
    pub async fn approve(
        &self,
        principal: &Principal,
        id: &RecordId,
        comment: Option<&str>,
        expected_version: Option<i64>,
    ) -> Result<InternshipRecord, PipelineError> {
        self.transition(principal, id, expected_version, Action::Approve, |p, r| {
            p.approve(r, principal, comment)
        })
    }

    #[instrument(skip_all, fields(actor_id = %principal.id, record_id = %id, action = "send_back"))]
    pub async fn send_back(
        &self,
        principal: &Principal,
        id: &RecordId,
        reason: &str,
        expected_version: Option<i64>,
    ) -> Result<InternshipRecord, PipelineError> {
        self.transition(principal, id, expected_version, Action::SendBack, |p, r| {
            p.send_back(r, principal, reason)
        })
    }

    #[instrument(skip_all, fields(actor_id = %principal.id, record_id = %id, action = "reject"))]
    pub async fn reject(
        &self,
        principal: &Principal,
        id: &RecordId,
        reason: &str,
        expected_version: Option<i64>,
    ) -> Result<InternshipRecord, PipelineError> {
        self.transition(principal, id, expected_version, Action::Reject, |p, r| {
            p.reject(r, principal, reason)
        })
    }

    #[instrument(skip_all, fields(actor_id = %principal.id, record_id = %id, action = "resubmit"))]
    pub async fn resubmit(
        &self,
        principal: &Principal,
        id: &RecordId,
        expected_version: Option<i64>,
    ) -> Result<InternshipRecord, PipelineError> {
        self.transition(principal, id, expected_version, Action::Resubmit, |p, r| {
            p.resubmit(r, principal)
        })
    }

    /// Attach the completion certificate and enter completion review.
    #[instrument(skip_all, fields(actor_id = %principal.id, record_id = %id, action = "register_completion"))]
    pub async fn register_completion(
        &self,
        principal: &Principal,
        id: &RecordId,
        certificate: Upload,
        expected_version: Option<i64>,
    ) -> Result<InternshipRecord, PipelineError> {
        let (current, expected) =
            self.fetch_versioned(principal, Action::RegisterCompletion, id, expected_version)?;
        self.pipeline
            .check_register_completion(&current, principal)
            .inspect_err(|e| denied(principal, Action::RegisterCompletion, e))?;
        self.uploads.check(&certificate)?;

        let stored = self.store_upload(certificate).await?;
        let result = self.records.commit(id, expected, |latest| {
            self.pipeline
                .register_completion(latest, principal, stored.clone())
        });
        self.settle_artifacts(result, &stored, current.certificate.as_ref())
            .await
    }

    /// Owner correction of employer, dates, duration and offer letter.
    #[instrument(skip_all, fields(actor_id = %principal.id, record_id = %id, action = "amend"))]
    pub async fn amend(
        &self,
        principal: &Principal,
        id: &RecordId,
        request: AmendRequest,
        expected_version: Option<i64>,
    ) -> Result<InternshipRecord, PipelineError> {
        let (current, expected) =
            self.fetch_versioned(principal, Action::Amend, id, expected_version)?;
        self.pipeline
            .check_amend(&current, principal)
            .inspect_err(|e| denied(principal, Action::Amend, e))?;
        request
            .details
            .validate()
            .map_err(PipelineError::Validation)?;

        let Some(upload) = request.offer_letter else {
            return self.records.commit(id, expected, |latest| {
                self.pipeline
                    .amend(latest, principal, request.details.clone(), None)
            });
        };

        self.uploads.check(&upload)?;
        let stored = self.store_upload(upload).await?;
        let result = self.records.commit(id, expected, |latest| {
            self.pipeline
                .amend(latest, principal, request.details.clone(), Some(stored.clone()))
        });
        self.settle_artifacts(result, &stored, current.offer_letter.as_ref())
            .await
    }

    #[instrument(skip_all, fields(actor_id = %principal.id, record_id = %id, action = "check_status"))]
    pub async fn status(
        &self,
        principal: &Principal,
        id: &RecordId,
    ) -> Result<ApprovalStatus, PipelineError> {
        let record = self.records.fetch(id)?;
        self.authorize(principal, Action::CheckStatus, Target::Record(&record))?;
        Ok(ApprovalStatus::from(&record))
    }

    /// Statuses of the calling student's own records.
    #[instrument(skip_all, fields(actor_id = %principal.id, action = "check_status"))]
    pub async fn my_statuses(
        &self,
        principal: &Principal,
    ) -> Result<Vec<ApprovalStatus>, PipelineError> {
        self.authority()
            .restrict_to(principal, &[Role::Student])
            .into_result()
            .inspect_err(|e| denied(principal, Action::CheckStatus, e))?;
        let own = ScopeFilter::Owner {
            student_id: principal.id.clone(),
        };
        Ok(self
            .records
            .fetch_for_student(&principal.id, &own)?
            .iter()
            .map(ApprovalStatus::from)
            .collect())
    }

    /// Administrative deletion. Artifacts go with the record.
    #[instrument(skip_all, fields(actor_id = %principal.id, record_id = %id, action = "delete"))]
    pub async fn delete(
        &self,
        principal: &Principal,
        id: &RecordId,
        expected_version: Option<i64>,
    ) -> Result<InternshipRecord, PipelineError> {
        let (current, expected) =
            self.fetch_versioned(principal, Action::Delete, id, expected_version)?;
        self.pipeline
            .check_delete(&current, principal)
            .inspect_err(|e| denied(principal, Action::Delete, e))?;
        let deleted = self.records.delete(id, expected)?;
        for artifact in deleted.artifacts() {
            self.discard(artifact).await;
        }
        info!(overridden = deleted.has_any_approval(), "record deleted");
        Ok(deleted)
    }

    #[instrument(skip_all, fields(actor_id = %principal.id, record_id = %id, action = "download_artifact"))]
    pub async fn download(
        &self,
        principal: &Principal,
        id: &RecordId,
        kind: ArtifactKind,
    ) -> Result<Artifact, PipelineError> {
        let record = self.records.fetch(id)?;
        self.authorize(principal, Action::DownloadArtifact, Target::Record(&record))?;
        let artifact_id = match kind {
            ArtifactKind::OfferLetter => record.offer_letter.as_ref(),
            ArtifactKind::Certificate => record.certificate.as_ref(),
        }
        .ok_or_else(|| PipelineError::NotFound("no such document on this record".into()))?;
        self.artifacts
            .load(artifact_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound("document not found".into()))
    }

    /// Fetch a record together with the version a commit must expect.
    /// The caller's standing on the record is settled before the client
    /// version is compared, so an outdated version never masks a denial
    /// or a terminal record.
    fn fetch_versioned(
        &self,
        principal: &Principal,
        action: Action,
        id: &RecordId,
        expected_version: Option<i64>,
    ) -> Result<(InternshipRecord, i64), PipelineError> {
        let current = self.records.fetch(id)?;
        let Some(expected) = expected_version else {
            let version = current.version;
            return Ok((current, version));
        };
        if expected != current.version {
            self.check_standing(principal, action, &current)?;
            info!(expected, actual = current.version, "stale request refused");
            return Err(PipelineError::stale(expected, current.version));
        }
        Ok((current, expected))
    }

    /// Checks that hold whatever version the caller saw. Review rights
    /// move with the chain, so a reviewer racing another only needs to
    /// be able to see the record to be told it changed.
    fn check_standing(
        &self,
        principal: &Principal,
        action: Action,
        record: &InternshipRecord,
    ) -> Result<(), PipelineError> {
        if !action.is_review() {
            return self.authorize(principal, action, Target::Record(record));
        }
        if record.status.is_terminal() {
            let err = PipelineError::StateConflict(ConflictKind::AlreadyTerminal);
            denied(principal, action, &err);
            return Err(err);
        }
        self.authority()
            .authorize(principal, Action::View, Target::Record(record))
            .into_result()
            .inspect_err(|e| denied(principal, action, e))
    }

    /// Run a pure transition against the fetched record to surface
    /// authorization and state errors, then commit it against the version
    /// the caller saw.
    fn transition<F>(
        &self,
        principal: &Principal,
        id: &RecordId,
        expected_version: Option<i64>,
        action: Action,
        apply: F,
    ) -> Result<InternshipRecord, PipelineError>
    where
        F: Fn(&ApprovalPipeline, &InternshipRecord) -> Result<InternshipRecord, PipelineError>,
    {
        let (current, expected) = self.fetch_versioned(principal, action, id, expected_version)?;
        let _ = apply(&self.pipeline, &current).inspect_err(|e| denied(principal, action, e))?;
        self.records
            .commit(id, expected, |latest| apply(&self.pipeline, latest))
            .inspect_err(|e| {
                if e.is_stale() {
                    info!(expected, "stale transition refused");
                }
            })
    }

    async fn store_upload(&self, upload: Upload) -> Result<ArtifactId, PipelineError> {
        self.artifacts
            .save(upload.bytes, &upload.mime_type, &upload.file_name)
            .await
    }

    /// After a commit that referenced `stored`: on failure drop the new
    /// artifact, on success drop the one it replaced.
    async fn settle_artifacts(
        &self,
        result: Result<InternshipRecord, PipelineError>,
        stored: &ArtifactId,
        replaced: Option<&ArtifactId>,
    ) -> Result<InternshipRecord, PipelineError> {
        match result {
            Ok(record) => {
                if let Some(old) = replaced.filter(|old| *old != stored) {
                    self.discard(old).await;
                }
                Ok(record)
            }
            Err(e) => {
                self.discard(stored).await;
                Err(e)
            }
        }
    }

    async fn discard(&self, id: &ArtifactId) {
        if let Err(e) = self.artifacts.delete(id).await {
            warn!(artifact_id = %id, error = %e, "failed to delete artifact");
        }
    }
}

fn denied(principal: &Principal, action: Action, error: &PipelineError) {
    match error {
        PipelineError::Authorization(reason) => {
            warn!(actor_id = %principal.id, %action, %reason, "request denied");
        }
        other => debug!(actor_id = %principal.id, %action, error = %other, "request refused"),
    }
}
