//! Role-based policy.
//!
//! Pure: no I/O, no clock, no ambient state. Every decision is a function
//! of the principal, the action and the target.

use std::fmt;

use itrack_core::ids::PrincipalId;
use itrack_core::principal::validate_role_assignment;
use itrack_core::{InternshipRecord, PipelineError, Principal, Role, ScopeFilter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Submit,
    View,
    List,
    Approve,
    SendBack,
    Reject,
    Resubmit,
    Amend,
    RegisterCompletion,
    Delete,
    DownloadArtifact,
    CheckStatus,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::View => "view",
            Self::List => "list",
            Self::Approve => "approve",
            Self::SendBack => "send_back",
            Self::Reject => "reject",
            Self::Resubmit => "resubmit",
            Self::Amend => "amend",
            Self::RegisterCompletion => "register_completion",
            Self::Delete => "delete",
            Self::DownloadArtifact => "download_artifact",
            Self::CheckStatus => "check_status",
        }
    }

    /// Transitions only the current approver role may perform.
    pub fn is_review(self) -> bool {
        matches!(self, Self::Approve | Self::SendBack | Self::Reject)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug)]
pub enum Target<'a> {
    Record(&'a InternshipRecord),
    /// Records owned by one student, as a whole.
    Owner(&'a PrincipalId),
    /// Every record the principal can see.
    Collection,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    /// Internal reason. Never shown to the caller.
    Deny(String),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn into_result(self) -> Result<(), PipelineError> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(reason) => Err(PipelineError::Authorization(reason)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RoleAuthority;

impl RoleAuthority {
    pub fn new() -> Self {
        Self
    }

    pub fn authorize(&self, principal: &Principal, action: Action, target: Target<'_>) -> Verdict {
        match (action, target) {
            (Action::Submit, Target::Owner(owner)) => {
                if principal.is_student() && principal.id == *owner {
                    Verdict::Allow
                } else {
                    Verdict::Deny("only a student may submit their own record".into())
                }
            }

            (Action::View | Action::CheckStatus | Action::DownloadArtifact, Target::Record(record)) => {
                if record.is_owned_by(&principal.id)
                    || (self.do_not_allow(principal, &[Role::Student]).is_allowed()
                        && self.scope_filter(principal).admits(record))
                {
                    Verdict::Allow
                } else {
                    Verdict::Deny(format!("record {} is outside the principal's scope", record.id))
                }
            }

            (Action::List, Target::Collection) => self.do_not_allow(principal, &[Role::Student]),

            (Action::List, Target::Owner(student_id)) => {
                if principal.id == *student_id {
                    Verdict::Allow
                } else {
                    self.do_not_allow(principal, &[Role::Student])
                }
            }

            (Action::Approve | Action::SendBack | Action::Reject, Target::Record(record)) => {
                let Some(role) = record.current_approver else {
                    return Verdict::Deny(format!("record {} has no active approver", record.id));
                };
                if !principal.has_role(role) {
                    return Verdict::Deny(format!(
                        "principal does not hold the active approver role {role}"
                    ));
                }
                if !self.scope_for_role(principal, role).admits(record) {
                    return Verdict::Deny(format!(
                        "record {} is outside the principal's {role} scope",
                        record.id
                    ));
                }
                Verdict::Allow
            }

            (Action::Resubmit | Action::Amend | Action::RegisterCompletion, Target::Record(record)) => {
                if principal.is_student() && record.is_owned_by(&principal.id) {
                    Verdict::Allow
                } else {
                    Verdict::Deny(format!("only the owner may {action} record {}", record.id))
                }
            }

            (Action::Delete, Target::Record(record)) => {
                let staff = self.do_not_allow(principal, &[Role::Student]);
                if !staff.is_allowed() {
                    return staff;
                }
                if self.scope_filter(principal).admits(record) {
                    Verdict::Allow
                } else {
                    Verdict::Deny(format!("record {} is outside the principal's scope", record.id))
                }
            }

            (action, target) => Verdict::Deny(format!("{action} is not defined for {target:?}")),
        }
    }

    /// Positive gate: allowed iff the principal holds one of `roles`.
    pub fn restrict_to(&self, principal: &Principal, roles: &[Role]) -> Verdict {
        if principal.has_any(roles) {
            Verdict::Allow
        } else {
            Verdict::Deny(format!("requires one of {}", join(roles)))
        }
    }

    /// Negative gate: allowed iff the principal holds at least one role
    /// outside `excluded`.
    pub fn do_not_allow(&self, principal: &Principal, excluded: &[Role]) -> Verdict {
        if principal.roles.iter().any(|r| !excluded.contains(r)) {
            Verdict::Allow
        } else {
            Verdict::Deny(format!("not available to {}", join(excluded)))
        }
    }

    /// Administrative override for deleting records that already carry
    /// approvals.
    pub fn can_override(&self, principal: &Principal) -> bool {
        principal.has_role(Role::Admin)
    }

    /// The scope a single role grants. A role whose organizational
    /// prerequisites are missing grants nothing.
    pub fn scope_for_role(&self, principal: &Principal, role: Role) -> ScopeFilter {
        if !principal.has_role(role)
            || validate_role_assignment(role, principal.department.as_deref(), principal.site)
                .is_err()
        {
            return ScopeFilter::Nothing;
        }
        match (role, principal.department.as_ref(), principal.site) {
            (Role::Tapcell | Role::Ceo | Role::Admin, _, _) => ScopeFilter::All,
            (Role::Principal, _, Some(site)) => ScopeFilter::Site { site },
            (Role::Hod | Role::InternshipCoordinator, Some(department), Some(site)) => {
                ScopeFilter::Department {
                    department: department.clone(),
                    site,
                }
            }
            (Role::Mentor, _, _) => ScopeFilter::Mentees {
                mentor_id: principal.id.clone(),
            },
            (Role::Student, _, _) => ScopeFilter::Owner {
                student_id: principal.id.clone(),
            },
            _ => ScopeFilter::Nothing,
        }
    }

    /// Widest scope across all the principal's roles.
    pub fn scope_filter(&self, principal: &Principal) -> ScopeFilter {
        principal
            .roles
            .iter()
            .map(|role| self.scope_for_role(principal, *role))
            .fold(ScopeFilter::Nothing, ScopeFilter::widest)
    }
}

fn join(roles: &[Role]) -> String {
    roles
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
