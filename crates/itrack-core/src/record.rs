//! Internship record, status machine states and the review trail.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ArtifactId, PrincipalId, RecordId};
use crate::roles::{Role, Site};

/// Lifecycle status of a record.
///
/// A freshly submitted record resolves straight to `UnderReview` at the
/// first role of its chain, so there is no stored "submitted" state.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    UnderReview,
    SentBack,
    Rejected,
    /// Placement approved by the whole chain.
    Completed,
    CompletionPending,
    CompletionVerified,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnderReview => "under_review",
            Self::SentBack => "sent_back",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
            Self::CompletionPending => "completion_pending",
            Self::CompletionVerified => "completion_verified",
        }
    }

    /// No reviewer may act. `Completed` is only left through completion
    /// registration by the owner.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Completed | Self::CompletionVerified
        )
    }

    /// A reviewer is expected to act.
    pub fn is_reviewable(self) -> bool {
        matches!(self, Self::UnderReview | Self::CompletionPending)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "under_review" => Ok(Self::UnderReview),
            "sent_back" => Ok(Self::SentBack),
            "rejected" => Ok(Self::Rejected),
            "completed" => Ok(Self::Completed),
            "completion_pending" => Ok(Self::CompletionPending),
            "completion_verified" => Ok(Self::CompletionVerified),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// Sub-phase of a record. Placement approval comes first, completion
/// verification follows on the same entity and the same trail.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Placement,
    Completion,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Placement => "placement",
            Self::Completion => "completion",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "placement" => Ok(Self::Placement),
            "completion" => Ok(Self::Completion),
            other => Err(format!("unknown phase: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
    SentBack,
    Resubmitted,
    CompletionRegistered,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::SentBack => "sent_back",
            Self::Resubmitted => "resubmitted",
            Self::CompletionRegistered => "completion_registered",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "sent_back" => Ok(Self::SentBack),
            "resubmitted" => Ok(Self::Resubmitted),
            "completion_registered" => Ok(Self::CompletionRegistered),
            other => Err(format!("unknown decision: {other}")),
        }
    }
}

/// One immutable entry of the review trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEntry {
    /// Role the actor acted in. `student` for owner entries.
    pub role: Role,
    pub actor_id: PrincipalId,
    pub decision: Decision,
    pub comment: Option<String>,
    pub phase: Phase,
    pub timestamp: DateTime<Utc>,
}

/// Owner-editable fields of a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternshipDetails {
    pub employer_name: String,
    pub employer_registration_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_weeks: u32,
}

impl InternshipDetails {
    pub fn validate(&self) -> Result<(), String> {
        if self.employer_name.trim().is_empty() {
            return Err("employer name is required".into());
        }
        if self.employer_registration_id.trim().is_empty() {
            return Err("employer registration id is required".into());
        }
        if self.end_date < self.start_date {
            return Err("end date must not be before start date".into());
        }
        if self.duration_weeks == 0 {
            return Err("duration must be at least one week".into());
        }
        Ok(())
    }
}

/// One student's engagement with one employer slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternshipRecord {
    pub id: RecordId,
    pub student_id: PrincipalId,
    pub department: String,
    pub site: Site,
    pub mentor_id: Option<PrincipalId>,
    #[serde(flatten)]
    pub details: InternshipDetails,
    pub offer_letter: Option<ArtifactId>,
    pub certificate: Option<ArtifactId>,
    pub status: RecordStatus,
    pub phase: Phase,
    pub current_approver: Option<Role>,
    pub trail: Vec<ReviewEntry>,
    /// Optimistic concurrency counter, bumped on every commit.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InternshipRecord {
    pub fn is_owned_by(&self, principal: &PrincipalId) -> bool {
        &self.student_id == principal
    }

    pub fn has_any_approval(&self) -> bool {
        self.trail.iter().any(|e| e.decision == Decision::Approved)
    }

    /// Approvals recorded since the last send-back or resubmission.
    pub fn approvals_in_round(&self) -> usize {
        self.trail
            .iter()
            .rev()
            .take_while(|e| {
                !matches!(
                    e.decision,
                    Decision::SentBack | Decision::Resubmitted | Decision::CompletionRegistered
                )
            })
            .filter(|e| e.decision == Decision::Approved)
            .count()
    }

    pub fn last_entry(&self) -> Option<&ReviewEntry> {
        self.trail.last()
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &ArtifactId> {
        self.offer_letter.iter().chain(self.certificate.iter())
    }
}
