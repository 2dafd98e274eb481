use serde::{Deserialize, Serialize};

use crate::ids::PrincipalId;
use crate::record::InternshipRecord;
use crate::roles::Site;

/// Predicate limiting which records a principal may list or view.
///
/// Produced by the role authority and pushed down into store queries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScopeFilter {
    All,
    Site { site: Site },
    Department { department: String, site: Site },
    Mentees { mentor_id: PrincipalId },
    Owner { student_id: PrincipalId },
    Nothing,
}

impl ScopeFilter {
    pub fn admits(&self, record: &InternshipRecord) -> bool {
        match self {
            Self::All => true,
            Self::Site { site } => record.site == *site,
            Self::Department { department, site } => {
                record.site == *site && record.department == *department
            }
            Self::Mentees { mentor_id } => record.mentor_id.as_ref() == Some(mentor_id),
            Self::Owner { student_id } => record.student_id == *student_id,
            Self::Nothing => false,
        }
    }

    /// Breadth ordering used to pick the widest filter when a principal
    /// holds several roles.
    pub fn breadth(&self) -> u8 {
        match self {
            Self::Nothing => 0,
            Self::Owner { .. } => 1,
            Self::Mentees { .. } => 2,
            Self::Department { .. } => 3,
            Self::Site { .. } => 4,
            Self::All => 5,
        }
    }

    /// Keep whichever of the two filters is wider.
    #[must_use]
    pub fn widest(self, other: Self) -> Self {
        if other.breadth() > self.breadth() {
            other
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{InternshipDetails, Phase, RecordStatus};
    use crate::ids::RecordId;
    use chrono::{NaiveDate, Utc};

    fn record(department: &str, site: Site, mentor: Option<&str>) -> InternshipRecord {
        let now = Utc::now();
        InternshipRecord {
            id: RecordId::new(),
            student_id: PrincipalId::from_raw("s1"),
            department: department.into(),
            site,
            mentor_id: mentor.map(PrincipalId::from_raw),
            details: InternshipDetails {
                employer_name: "Acme".into(),
                employer_registration_id: "REG-1".into(),
                start_date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
                duration_weeks: 8,
            },
            offer_letter: None,
            certificate: None,
            status: RecordStatus::UnderReview,
            phase: Phase::Placement,
            current_approver: None,
            trail: vec![],
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn department_scope_needs_matching_site() {
        let filter = ScopeFilter::Department {
            department: "cse".into(),
            site: Site::Sec,
        };
        assert!(filter.admits(&record("cse", Site::Sec, None)));
        assert!(!filter.admits(&record("cse", Site::Sit, None)));
        assert!(!filter.admits(&record("ece", Site::Sec, None)));
    }

    #[test]
    fn mentees_scope() {
        let filter = ScopeFilter::Mentees {
            mentor_id: PrincipalId::from_raw("m1"),
        };
        assert!(filter.admits(&record("cse", Site::Sec, Some("m1"))));
        assert!(!filter.admits(&record("cse", Site::Sec, Some("m2"))));
        assert!(!filter.admits(&record("cse", Site::Sec, None)));
    }

    #[test]
    fn nothing_admits_nothing() {
        assert!(!ScopeFilter::Nothing.admits(&record("cse", Site::Sec, None)));
        assert!(ScopeFilter::All.admits(&record("cse", Site::Sec, None)));
    }

    #[test]
    fn widest_wins() {
        let site = ScopeFilter::Site { site: Site::Sit };
        let mentees = ScopeFilter::Mentees {
            mentor_id: PrincipalId::from_raw("m1"),
        };
        assert_eq!(mentees.clone().widest(site.clone()), site);
        assert_eq!(site.clone().widest(mentees), site);
        assert_eq!(ScopeFilter::Nothing.widest(ScopeFilter::All), ScopeFilter::All);
    }
}
