use serde::{Deserialize, Serialize};

use crate::roles::Role;

/// Ordered escalation sequence of approver roles.
///
/// Owned by configuration. Construction rejects empty chains, duplicate
/// roles, and roles that can never approve (`student`, `admin`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Role>", into = "Vec<Role>")]
pub struct ApprovalChain(Vec<Role>);

impl ApprovalChain {
    pub fn new(roles: Vec<Role>) -> Result<Self, String> {
        if roles.is_empty() {
            return Err("approval chain must not be empty".into());
        }
        for (i, role) in roles.iter().enumerate() {
            if matches!(role, Role::Student | Role::Admin) {
                return Err(format!("role {role} cannot appear in an approval chain"));
            }
            if roles[..i].contains(role) {
                return Err(format!("role {role} appears more than once in the chain"));
            }
        }
        Ok(Self(roles))
    }

    /// Single-step chain, used for the completion sub-phase.
    pub fn single(role: Role) -> Result<Self, String> {
        Self::new(vec![role])
    }

    pub fn first(&self) -> Role {
        self.0[0]
    }

    pub fn position(&self, role: Role) -> Option<usize> {
        self.0.iter().position(|r| *r == role)
    }

    /// The role after `role`, or `None` when `role` is last (or absent).
    pub fn next_after(&self, role: Role) -> Option<Role> {
        self.position(role).and_then(|i| self.0.get(i + 1).copied())
    }

    pub fn is_last(&self, role: Role) -> bool {
        self.0.last() == Some(&role)
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }

    pub fn roles(&self) -> &[Role] {
        &self.0
    }
}

impl TryFrom<Vec<Role>> for ApprovalChain {
    type Error = String;
    fn try_from(roles: Vec<Role>) -> Result<Self, Self::Error> {
        Self::new(roles)
    }
}

impl From<ApprovalChain> for Vec<Role> {
    fn from(chain: ApprovalChain) -> Self {
        chain.0
    }
}

impl Default for ApprovalChain {
    fn default() -> Self {
        Self(vec![
            Role::Mentor,
            Role::Hod,
            Role::Principal,
            Role::Tapcell,
            Role::Ceo,
        ])
    }
}
