use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::PrincipalId;
use crate::roles::{Role, Site};

/// An authenticated actor.
///
/// Rebuilt from a verified credential on every request and never mutated
/// afterwards; every authority and pipeline call receives it explicitly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub roles: BTreeSet<Role>,
    pub department: Option<String>,
    pub site: Option<Site>,
}

impl Principal {
    pub fn new(
        id: PrincipalId,
        roles: impl IntoIterator<Item = Role>,
        department: Option<String>,
        site: Option<Site>,
    ) -> Self {
        Self {
            id,
            roles: roles.into_iter().collect(),
            department,
            site,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_any(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.roles.contains(r))
    }

    pub fn is_student(&self) -> bool {
        self.has_role(Role::Student)
    }
}

/// Check that a principal's organizational attributes satisfy a role.
///
/// Department-scoped roles need a department, site-scoped roles need a
/// site. Returns a description of the first missing attribute.
pub fn validate_role_assignment(
    role: Role,
    department: Option<&str>,
    site: Option<Site>,
) -> Result<(), String> {
    if role.requires_department() && department.map_or(true, str::is_empty) {
        return Err(format!("department is required for role {role}"));
    }
    if role.requires_site() && site.is_none() {
        return Err(format!("site is required for role {role}"));
    }
    Ok(())
}
