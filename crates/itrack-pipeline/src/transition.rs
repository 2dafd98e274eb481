//! The approval state machine.
//!
//! Every transition is a pure function from the current record to the
//! next one: the input is never touched, so a refused transition leaves
//! nothing half-applied. Persisting the result is the caller's job.
//!
//! ```text
//!              approve (not last)
//!             ┌──────────────┐
//!             ▼              │
//! submit ─► under_review ────┴─ approve (last) ─► completed
//!             │  ▲    │                              │
//!   send_back │  │    │ reject                       │ register_completion
//!             ▼  │    ▼                              ▼
//!        sent_back   rejected               completion_pending
//!             │  resubmit                      │    │      │
//!             └──────────►                     │    │      └ approve ─► completion_verified
//!                                    send_back │    └ reject ─► rejected
//!                                              ▼
//!                                         sent_back ── register_completion ──► completion_pending
//! ```

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::info;

use itrack_auth::{Action, RoleAuthority, Target};
use itrack_core::ids::{ArtifactId, PrincipalId, RecordId};
use itrack_core::{
    ApprovalChain, ConflictKind, Decision, InternshipDetails, InternshipRecord, Phase,
    PipelineError, Principal, RecordStatus, ReviewEntry, Role, Site,
};
use itrack_settings::PipelineSettings;

/// Everything needed to open a new record.
#[derive(Clone, Debug)]
pub struct Submission {
    pub student_id: PrincipalId,
    pub department: String,
    pub site: Site,
    pub mentor_id: Option<PrincipalId>,
    pub details: InternshipDetails,
    pub offer_letter: Option<ArtifactId>,
}

#[derive(Clone, Debug)]
pub struct ApprovalPipeline {
    chains: BTreeMap<Site, ApprovalChain>,
    completion: ApprovalChain,
    authority: RoleAuthority,
}

impl ApprovalPipeline {
    pub fn new(
        chains: BTreeMap<Site, ApprovalChain>,
        completion_verifier: Role,
    ) -> Result<Self, PipelineError> {
        if !matches!(
            completion_verifier,
            Role::Mentor | Role::InternshipCoordinator | Role::Hod
        ) {
            return Err(PipelineError::Internal(format!(
                "{completion_verifier} cannot verify completion"
            )));
        }
        let completion = ApprovalChain::single(completion_verifier).map_err(PipelineError::Internal)?;
        Ok(Self {
            chains,
            completion,
            authority: RoleAuthority::new(),
        })
    }

    pub fn from_settings(settings: &PipelineSettings) -> Result<Self, PipelineError> {
        let chains = settings
            .approval_chains()
            .map_err(|e| PipelineError::Internal(e.to_string()))?;
        Self::new(chains, settings.completion_verifier)
    }

    pub fn chain_for(&self, site: Site) -> Result<&ApprovalChain, PipelineError> {
        self.chains
            .get(&site)
            .ok_or_else(|| PipelineError::Internal(format!("no approval chain configured for {site}")))
    }

    pub fn completion_verifier(&self) -> Role {
        self.completion.first()
    }

    pub fn authority(&self) -> &RoleAuthority {
        &self.authority
    }

    /// Chain governing the record's current phase.
    fn active_chain(&self, record: &InternshipRecord) -> Result<&ApprovalChain, PipelineError> {
        match record.phase {
            Phase::Placement => self.chain_for(record.site),
            Phase::Completion => Ok(&self.completion),
        }
    }

    /// Build a new record, already under review at the first role of its
    /// site's chain.
    pub fn open(&self, submission: Submission) -> Result<InternshipRecord, PipelineError> {
        submission
            .details
            .validate()
            .map_err(PipelineError::Validation)?;
        let first = self.chain_for(submission.site)?.first();
        let now = Utc::now();
        Ok(InternshipRecord {
            id: RecordId::new(),
            student_id: submission.student_id,
            department: submission.department,
            site: submission.site,
            mentor_id: submission.mentor_id,
            details: submission.details,
            offer_letter: submission.offer_letter,
            certificate: None,
            status: RecordStatus::UnderReview,
            phase: Phase::Placement,
            current_approver: Some(first),
            trail: Vec::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }

    /// Shared checks for approve, send back and reject, in this order:
    /// terminal state, authority, reviewable status. Returns the role the
    /// actor is acting in.
    fn check_review(
        &self,
        record: &InternshipRecord,
        actor: &Principal,
        action: Action,
    ) -> Result<Role, PipelineError> {
        if record.status.is_terminal() {
            return Err(PipelineError::StateConflict(ConflictKind::AlreadyTerminal));
        }
        self.authority
            .authorize(actor, action, Target::Record(record))
            .into_result()?;
        if !record.status.is_reviewable() {
            return Err(PipelineError::wrong_state("under review", record.status));
        }
        let role = record.current_approver.ok_or_else(|| {
            PipelineError::Internal(format!("record {} is reviewable without an approver", record.id))
        })?;
        if !self.active_chain(record)?.contains(role) {
            return Err(PipelineError::Internal(format!(
                "approver {role} is not part of the {} chain for {}",
                record.phase, record.site
            )));
        }
        Ok(role)
    }

    pub fn approve(
        &self,
        record: &InternshipRecord,
        actor: &Principal,
        comment: Option<&str>,
    ) -> Result<InternshipRecord, PipelineError> {
        let role = self.check_review(record, actor, Action::Approve)?;
        let chain = self.active_chain(record)?;

        let mut next = record.clone();
        next.trail.push(entry(role, actor, Decision::Approved, optional(comment), record.phase));
        match chain.next_after(role) {
            Some(following) => next.current_approver = Some(following),
            None => {
                next.current_approver = None;
                next.status = match record.phase {
                    Phase::Placement => RecordStatus::Completed,
                    Phase::Completion => RecordStatus::CompletionVerified,
                };
            }
        }
        log_transition(record, &next, actor, Action::Approve);
        Ok(next)
    }

    /// Return the record to its owner. The approver resets to the first
    /// role of the active chain, so every earlier approver re-validates.
    pub fn send_back(
        &self,
        record: &InternshipRecord,
        actor: &Principal,
        reason: &str,
    ) -> Result<InternshipRecord, PipelineError> {
        let role = self.check_review(record, actor, Action::SendBack)?;
        let reason = required(reason, "a reason is required to send a record back")?;
        let first = self.active_chain(record)?.first();

        let mut next = record.clone();
        next.trail.push(entry(role, actor, Decision::SentBack, Some(reason), record.phase));
        next.status = RecordStatus::SentBack;
        next.current_approver = Some(first);
        log_transition(record, &next, actor, Action::SendBack);
        Ok(next)
    }

    pub fn reject(
        &self,
        record: &InternshipRecord,
        actor: &Principal,
        reason: &str,
    ) -> Result<InternshipRecord, PipelineError> {
        let role = self.check_review(record, actor, Action::Reject)?;
        let reason = required(reason, "a reason is required to reject a record")?;

        let mut next = record.clone();
        next.trail.push(entry(role, actor, Decision::Rejected, Some(reason), record.phase));
        next.status = RecordStatus::Rejected;
        next.current_approver = None;
        log_transition(record, &next, actor, Action::Reject);
        Ok(next)
    }

    pub fn check_resubmit(
        &self,
        record: &InternshipRecord,
        actor: &Principal,
    ) -> Result<(), PipelineError> {
        self.authority
            .authorize(actor, Action::Resubmit, Target::Record(record))
            .into_result()?;
        if record.status.is_terminal() {
            return Err(PipelineError::StateConflict(ConflictKind::AlreadyTerminal));
        }
        if record.status != RecordStatus::SentBack || record.phase != Phase::Placement {
            return Err(PipelineError::wrong_state(
                "sent back during placement",
                describe(record),
            ));
        }
        Ok(())
    }

    /// Owner puts a sent-back placement back under review from the top.
    pub fn resubmit(
        &self,
        record: &InternshipRecord,
        actor: &Principal,
    ) -> Result<InternshipRecord, PipelineError> {
        self.check_resubmit(record, actor)?;
        let first = self.chain_for(record.site)?.first();

        let mut next = record.clone();
        next.trail
            .push(entry(Role::Student, actor, Decision::Resubmitted, None, Phase::Placement));
        next.status = RecordStatus::UnderReview;
        next.current_approver = Some(first);
        log_transition(record, &next, actor, Action::Resubmit);
        Ok(next)
    }

    /// Completion can be registered once the placement is fully approved,
    /// and again after the verifier sent the completion back.
    pub fn check_register_completion(
        &self,
        record: &InternshipRecord,
        actor: &Principal,
    ) -> Result<(), PipelineError> {
        self.authority
            .authorize(actor, Action::RegisterCompletion, Target::Record(record))
            .into_result()?;
        match (record.phase, record.status) {
            (Phase::Placement, RecordStatus::Completed)
            | (Phase::Completion, RecordStatus::SentBack) => Ok(()),
            (_, RecordStatus::Rejected | RecordStatus::CompletionVerified) => {
                Err(PipelineError::StateConflict(ConflictKind::AlreadyTerminal))
            }
            _ => Err(PipelineError::wrong_state(
                "completed, or sent back during completion",
                describe(record),
            )),
        }
    }

    pub fn register_completion(
        &self,
        record: &InternshipRecord,
        actor: &Principal,
        certificate: ArtifactId,
    ) -> Result<InternshipRecord, PipelineError> {
        self.check_register_completion(record, actor)?;

        let mut next = record.clone();
        next.trail.push(entry(
            Role::Student,
            actor,
            Decision::CompletionRegistered,
            None,
            Phase::Completion,
        ));
        next.certificate = Some(certificate);
        next.phase = Phase::Completion;
        next.status = RecordStatus::CompletionPending;
        next.current_approver = Some(self.completion_verifier());
        log_transition(record, &next, actor, Action::RegisterCompletion);
        Ok(next)
    }

    /// Owner edits are open while the record is sent back, or while it
    /// still sits with the first placement approver and nobody in the
    /// current round has approved it.
    pub fn check_amend(
        &self,
        record: &InternshipRecord,
        actor: &Principal,
    ) -> Result<(), PipelineError> {
        self.authority
            .authorize(actor, Action::Amend, Target::Record(record))
            .into_result()?;
        if record.status.is_terminal() {
            return Err(PipelineError::StateConflict(ConflictKind::AlreadyTerminal));
        }
        if record.phase != Phase::Placement {
            return Err(PipelineError::wrong_state("in placement", describe(record)));
        }
        let first = self.chain_for(record.site)?.first();
        let open = match record.status {
            RecordStatus::SentBack => true,
            RecordStatus::UnderReview => {
                record.current_approver == Some(first) && record.approvals_in_round() == 0
            }
            _ => false,
        };
        if open {
            Ok(())
        } else {
            Err(PipelineError::wrong_state(
                "sent back, or awaiting its first review",
                describe(record),
            ))
        }
    }

    pub fn amend(
        &self,
        record: &InternshipRecord,
        actor: &Principal,
        details: InternshipDetails,
        offer_letter: Option<ArtifactId>,
    ) -> Result<InternshipRecord, PipelineError> {
        self.check_amend(record, actor)?;
        details.validate().map_err(PipelineError::Validation)?;

        let mut next = record.clone();
        next.details = details;
        if offer_letter.is_some() {
            next.offer_letter = offer_letter;
        }
        info!(record_id = %record.id, actor_id = %actor.id, "record amended");
        Ok(next)
    }

    /// Deletion is staff-only and in scope. Once any approval exists it
    /// additionally needs the admin override.
    pub fn check_delete(
        &self,
        record: &InternshipRecord,
        actor: &Principal,
    ) -> Result<(), PipelineError> {
        self.authority
            .authorize(actor, Action::Delete, Target::Record(record))
            .into_result()?;
        if record.has_any_approval() && !self.authority.can_override(actor) {
            return Err(PipelineError::wrong_state(
                "free of approvals",
                "already approved",
            ));
        }
        Ok(())
    }
}

fn entry(
    role: Role,
    actor: &Principal,
    decision: Decision,
    comment: Option<String>,
    phase: Phase,
) -> ReviewEntry {
    ReviewEntry {
        role,
        actor_id: actor.id.clone(),
        decision,
        comment,
        phase,
        timestamp: Utc::now(),
    }
}

fn optional(comment: Option<&str>) -> Option<String> {
    comment
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

fn required(reason: &str, message: &str) -> Result<String, PipelineError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(PipelineError::Validation(message.to_string()));
    }
    Ok(reason.to_string())
}

fn describe(record: &InternshipRecord) -> String {
    format!("{} during {}", record.status, record.phase)
}

fn log_transition(from: &InternshipRecord, to: &InternshipRecord, actor: &Principal, action: Action) {
    info!(
        record_id = %from.id,
        actor_id = %actor.id,
        %action,
        from = %from.status,
        to = %to.status,
        approver = ?to.current_approver,
        "record transitioned"
    );
}
