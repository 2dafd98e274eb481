//! Role tags and institution sites.
//!
//! Roles are flat data: a principal carries a set of them and approval
//! order is expressed by an [`ApprovalChain`](crate::ApprovalChain), not by
//! any ordering on `Role` itself.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A role tag carried by a principal.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Mentor,
    #[serde(alias = "internshipcoordinator")]
    InternshipCoordinator,
    Hod,
    Principal,
    Tapcell,
    Ceo,
    Admin,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Student,
        Role::Mentor,
        Role::InternshipCoordinator,
        Role::Hod,
        Role::Principal,
        Role::Tapcell,
        Role::Ceo,
        Role::Admin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Mentor => "mentor",
            Self::InternshipCoordinator => "internship_coordinator",
            Self::Hod => "hod",
            Self::Principal => "principal",
            Self::Tapcell => "tapcell",
            Self::Ceo => "ceo",
            Self::Admin => "admin",
        }
    }

    pub fn is_staff(self) -> bool {
        self != Self::Student
    }

    /// Roles whose scope is a single department.
    pub fn requires_department(self) -> bool {
        matches!(self, Self::Mentor | Self::InternshipCoordinator | Self::Hod)
    }

    /// Roles whose scope is bounded by an institution site.
    pub fn requires_site(self) -> bool {
        self.requires_department() || self == Self::Principal
    }

    /// Roles that see every record regardless of department or site.
    pub fn is_institution_wide(self) -> bool {
        matches!(self, Self::Tapcell | Self::Ceo | Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Self::Student),
            "mentor" => Ok(Self::Mentor),
            "internship_coordinator" | "internshipcoordinator" => Ok(Self::InternshipCoordinator),
            "hod" => Ok(Self::Hod),
            "principal" => Ok(Self::Principal),
            "tapcell" => Ok(Self::Tapcell),
            "ceo" => Ok(Self::Ceo),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// One of the two institution sites.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    Sec,
    Sit,
}

impl Site {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sec => "sec",
            Self::Sit => "sit",
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Site {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sec" => Ok(Self::Sec),
            "sit" => Ok(Self::Sit),
            other => Err(format!("unknown site: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_string_roundtrip() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn legacy_coordinator_spelling_accepted() {
        assert_eq!(
            "internshipcoordinator".parse::<Role>().unwrap(),
            Role::InternshipCoordinator
        );
        let parsed: Role = serde_json::from_str("\"internshipcoordinator\"").unwrap();
        assert_eq!(parsed, Role::InternshipCoordinator);
    }

    #[test]
    fn unknown_role_rejected() {
        assert!("dean".parse::<Role>().is_err());
    }

    #[test]
    fn scope_attribute_requirements() {
        assert!(Role::Mentor.requires_department());
        assert!(Role::Hod.requires_site());
        assert!(!Role::Principal.requires_department());
        assert!(Role::Principal.requires_site());
        assert!(!Role::Ceo.requires_site());
        assert!(Role::Tapcell.is_institution_wide());
        assert!(!Role::Student.is_staff());
    }

    #[test]
    fn site_parse_is_case_insensitive() {
        assert_eq!("SEC".parse::<Site>().unwrap(), Site::Sec);
        assert_eq!("sit".parse::<Site>().unwrap(), Site::Sit);
        assert!("mit".parse::<Site>().is_err());
    }
}
