//! Internship records and their review trail.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, instrument};

use itrack_core::ids::{ArtifactId, PrincipalId, RecordId};
use itrack_core::{InternshipDetails, InternshipRecord, ReviewEntry, ScopeFilter};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{get, get_opt, parse_date, parse_enum, parse_timestamp};

const RECORD_COLUMNS: &str = "id, student_id, department, site, mentor_id, employer_name,
    employer_registration_id, start_date, end_date, duration_weeks, offer_letter_id,
    certificate_id, status, phase, current_approver, version, created_at, updated_at";

pub struct RecordRepo {
    db: Database,
}

impl RecordRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new record, refusing when the student already holds
    /// `limit` non-rejected records. The count and the insert run in one
    /// transaction.
    #[instrument(skip(self, record), fields(record_id = %record.id, student_id = %record.student_id))]
    pub fn insert_within_limit(
        &self,
        record: &InternshipRecord,
        limit: u32,
    ) -> Result<InternshipRecord, StoreError> {
        self.db.with_transaction(|tx| {
            let held = count_active(tx, &record.student_id)?;
            if held >= i64::from(limit) {
                return Err(StoreError::LimitReached(limit));
            }
            insert_row(tx, record)?;
            insert_trail(tx, &record.id, 0, &record.trail)?;
            Ok(record.clone())
        })
    }

    #[instrument(skip(self), fields(record_id = %id))]
    pub fn fetch(&self, id: &RecordId) -> Result<InternshipRecord, StoreError> {
        self.db.with_conn(|conn| load(conn, id))
    }

    /// Records admitted by `filter`, newest first.
    #[instrument(skip(self))]
    pub fn fetch_many(&self, filter: &ScopeFilter) -> Result<Vec<InternshipRecord>, StoreError> {
        self.query_scoped(filter, None)
    }

    /// One student's records, further restricted by `filter`.
    #[instrument(skip(self, filter), fields(student_id = %student_id))]
    pub fn fetch_for_student(
        &self,
        student_id: &PrincipalId,
        filter: &ScopeFilter,
    ) -> Result<Vec<InternshipRecord>, StoreError> {
        self.query_scoped(filter, Some(student_id))
    }

    fn query_scoped(
        &self,
        filter: &ScopeFilter,
        student_id: Option<&PrincipalId>,
    ) -> Result<Vec<InternshipRecord>, StoreError> {
        let Some((clause, mut params)) = scope_clause(filter) else {
            return Ok(Vec::new());
        };
        let mut sql = format!("SELECT {RECORD_COLUMNS} FROM internships WHERE {clause}");
        if let Some(student_id) = student_id {
            sql.push_str(&format!(" AND student_id = ?{}", params.len() + 1));
            params.push(student_id.as_str().to_string());
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");

        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let param_refs: Vec<&dyn rusqlite::types::ToSql> = params
                .iter()
                .map(|p| p as &dyn rusqlite::types::ToSql)
                .collect();
            let mut rows = stmt.query(param_refs.as_slice())?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_record(row)?);
            }
            for record in &mut records {
                record.trail = load_trail(conn, &record.id)?;
            }
            Ok(records)
        })
    }

    /// Optimistic read-modify-write.
    ///
    /// Loads the record, checks its version against `expected_version`,
    /// applies `mutation` and writes the result with the version bumped by
    /// one. The mutation may only append to the trail. Nothing is written
    /// when any step fails.
    #[instrument(skip(self, mutation), fields(record_id = %id))]
    pub fn commit<F, E>(
        &self,
        id: &RecordId,
        expected_version: i64,
        mutation: F,
    ) -> Result<InternshipRecord, E>
    where
        F: FnOnce(&InternshipRecord) -> Result<InternshipRecord, E>,
        E: From<StoreError>,
    {
        self.db.with_transaction(|tx| {
            let current = load(tx, id)?;
            if current.version != expected_version {
                return Err(StoreError::Stale {
                    expected: expected_version,
                    actual: current.version,
                }
                .into());
            }

            let mut next = mutation(&current)?;
            if next.id != current.id || next.student_id != current.student_id {
                return Err(StoreError::Conflict("record identity may not change".into()).into());
            }
            let kept = current.trail.len();
            if next.trail.len() < kept || next.trail[..kept] != current.trail[..] {
                return Err(StoreError::Conflict("review trail may only grow".into()).into());
            }

            next.version = current.version + 1;
            next.updated_at = Utc::now();

            let changed = tx
                .execute(
                    "UPDATE internships SET mentor_id = ?1, employer_name = ?2,
                        employer_registration_id = ?3, start_date = ?4, end_date = ?5,
                        duration_weeks = ?6, offer_letter_id = ?7, certificate_id = ?8,
                        status = ?9, phase = ?10, current_approver = ?11, version = ?12,
                        updated_at = ?13
                     WHERE id = ?14 AND version = ?15",
                    rusqlite::params![
                        next.mentor_id.as_ref().map(PrincipalId::as_str),
                        next.details.employer_name,
                        next.details.employer_registration_id,
                        next.details.start_date.to_string(),
                        next.details.end_date.to_string(),
                        next.details.duration_weeks,
                        next.offer_letter.as_ref().map(ArtifactId::as_str),
                        next.certificate.as_ref().map(ArtifactId::as_str),
                        next.status.as_str(),
                        next.phase.as_str(),
                        next.current_approver.map(|r| r.as_str()),
                        next.version,
                        next.updated_at.to_rfc3339(),
                        id.as_str(),
                        expected_version,
                    ],
                )
                .map_err(StoreError::from)?;
            if changed == 0 {
                return Err(StoreError::Stale {
                    expected: expected_version,
                    actual: current_version(tx, id)?,
                }
                .into());
            }

            insert_trail(tx, id, kept, &next.trail[kept..])?;
            debug!(
                version = next.version,
                appended = next.trail.len() - kept,
                "record committed"
            );
            Ok(next)
        })
    }

    /// Delete a record and its trail, guarded by the same version check as
    /// [`commit`](Self::commit). Returns the deleted record.
    #[instrument(skip(self), fields(record_id = %id))]
    pub fn delete(
        &self,
        id: &RecordId,
        expected_version: i64,
    ) -> Result<InternshipRecord, StoreError> {
        self.db.with_transaction(|tx| {
            let current = load(tx, id)?;
            if current.version != expected_version {
                return Err(StoreError::Stale {
                    expected: expected_version,
                    actual: current.version,
                });
            }
            let _ = tx.execute("DELETE FROM internships WHERE id = ?1", [id.as_str()])?;
            Ok(current)
        })
    }

    /// Non-rejected records held by a student.
    pub fn count_active_for_student(&self, student_id: &PrincipalId) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| count_active(conn, student_id))
    }
}

/// SQL predicate for a scope filter. `None` means the filter admits
/// nothing and no query is needed.
fn scope_clause(filter: &ScopeFilter) -> Option<(&'static str, Vec<String>)> {
    match filter {
        ScopeFilter::All => Some(("1=1", vec![])),
        ScopeFilter::Site { site } => Some(("site = ?1", vec![site.as_str().to_string()])),
        ScopeFilter::Department { department, site } => Some((
            "department = ?1 AND site = ?2",
            vec![department.clone(), site.as_str().to_string()],
        )),
        ScopeFilter::Mentees { mentor_id } => {
            Some(("mentor_id = ?1", vec![mentor_id.as_str().to_string()]))
        }
        ScopeFilter::Owner { student_id } => {
            Some(("student_id = ?1", vec![student_id.as_str().to_string()]))
        }
        ScopeFilter::Nothing => None,
    }
}

fn count_active(conn: &Connection, student_id: &PrincipalId) -> Result<i64, StoreError> {
    conn.query_row(
        "SELECT COUNT(*) FROM internships WHERE student_id = ?1 AND status != 'rejected'",
        [student_id.as_str()],
        |row| row.get(0),
    )
    .map_err(StoreError::from)
}

fn current_version(conn: &Connection, id: &RecordId) -> Result<i64, StoreError> {
    conn.query_row(
        "SELECT version FROM internships WHERE id = ?1",
        [id.as_str()],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("record {id}")))
}

fn insert_row(conn: &Connection, r: &InternshipRecord) -> Result<(), StoreError> {
    let _ = conn.execute(
        "INSERT INTO internships (id, student_id, department, site, mentor_id, employer_name,
            employer_registration_id, start_date, end_date, duration_weeks, offer_letter_id,
            certificate_id, status, phase, current_approver, version, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        rusqlite::params![
            r.id.as_str(),
            r.student_id.as_str(),
            r.department,
            r.site.as_str(),
            r.mentor_id.as_ref().map(PrincipalId::as_str),
            r.details.employer_name,
            r.details.employer_registration_id,
            r.details.start_date.to_string(),
            r.details.end_date.to_string(),
            r.details.duration_weeks,
            r.offer_letter.as_ref().map(ArtifactId::as_str),
            r.certificate.as_ref().map(ArtifactId::as_str),
            r.status.as_str(),
            r.phase.as_str(),
            r.current_approver.map(|role| role.as_str()),
            r.version,
            r.created_at.to_rfc3339(),
            r.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn insert_trail(
    conn: &Connection,
    id: &RecordId,
    first_seq: usize,
    entries: &[ReviewEntry],
) -> Result<(), StoreError> {
    if entries.is_empty() {
        return Ok(());
    }
    let mut stmt = conn.prepare(
        "INSERT INTO review_trail (record_id, seq, role, actor_id, decision, comment, phase, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for (offset, entry) in entries.iter().enumerate() {
        let seq = i64::try_from(first_seq + offset)
            .map_err(|e| StoreError::Conflict(format!("trail sequence overflow: {e}")))?;
        let _ = stmt.execute(rusqlite::params![
            id.as_str(),
            seq,
            entry.role.as_str(),
            entry.actor_id.as_str(),
            entry.decision.as_str(),
            entry.comment,
            entry.phase.as_str(),
            entry.timestamp.to_rfc3339(),
        ])?;
    }
    Ok(())
}

fn load(conn: &Connection, id: &RecordId) -> Result<InternshipRecord, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLUMNS} FROM internships WHERE id = ?1"
    ))?;
    let mut rows = stmt.query([id.as_str()])?;
    let mut record = match rows.next()? {
        Some(row) => row_to_record(row)?,
        None => return Err(StoreError::NotFound(format!("record {id}"))),
    };
    record.trail = load_trail(conn, id)?;
    Ok(record)
}

fn load_trail(conn: &Connection, id: &RecordId) -> Result<Vec<ReviewEntry>, StoreError> {
    const T: &str = "review_trail";
    let mut stmt = conn.prepare(
        "SELECT role, actor_id, decision, comment, phase, timestamp
         FROM review_trail WHERE record_id = ?1 ORDER BY seq ASC",
    )?;
    let mut rows = stmt.query([id.as_str()])?;
    let mut trail = Vec::new();
    while let Some(row) = rows.next()? {
        let role: String = get(row, 0, T, "role")?;
        let actor: String = get(row, 1, T, "actor_id")?;
        let decision: String = get(row, 2, T, "decision")?;
        let phase: String = get(row, 4, T, "phase")?;
        let timestamp: String = get(row, 5, T, "timestamp")?;
        trail.push(ReviewEntry {
            role: parse_enum(&role, T, "role")?,
            actor_id: PrincipalId::from_raw(actor),
            decision: parse_enum(&decision, T, "decision")?,
            comment: get_opt(row, 3, T, "comment")?,
            phase: parse_enum(&phase, T, "phase")?,
            timestamp: parse_timestamp(&timestamp, T, "timestamp")?,
        });
    }
    Ok(trail)
}

/// Map a row to a record with an empty trail.
fn row_to_record(row: &rusqlite::Row<'_>) -> Result<InternshipRecord, StoreError> {
    const T: &str = "internships";
    let site: String = get(row, 3, T, "site")?;
    let start: String = get(row, 7, T, "start_date")?;
    let end: String = get(row, 8, T, "end_date")?;
    let status: String = get(row, 12, T, "status")?;
    let phase: String = get(row, 13, T, "phase")?;
    let approver: Option<String> = get_opt(row, 14, T, "current_approver")?;
    let created: String = get(row, 16, T, "created_at")?;
    let updated: String = get(row, 17, T, "updated_at")?;

    Ok(InternshipRecord {
        id: RecordId::from_raw(get::<String>(row, 0, T, "id")?),
        student_id: PrincipalId::from_raw(get::<String>(row, 1, T, "student_id")?),
        department: get(row, 2, T, "department")?,
        site: parse_enum(&site, T, "site")?,
        mentor_id: get_opt::<String>(row, 4, T, "mentor_id")?.map(PrincipalId::from_raw),
        details: InternshipDetails {
            employer_name: get(row, 5, T, "employer_name")?,
            employer_registration_id: get(row, 6, T, "employer_registration_id")?,
            start_date: parse_date(&start, T, "start_date")?,
            end_date: parse_date(&end, T, "end_date")?,
            duration_weeks: get(row, 9, T, "duration_weeks")?,
        },
        offer_letter: get_opt::<String>(row, 10, T, "offer_letter_id")?.map(ArtifactId::from_raw),
        certificate: get_opt::<String>(row, 11, T, "certificate_id")?.map(ArtifactId::from_raw),
        status: parse_enum(&status, T, "status")?,
        phase: parse_enum(&phase, T, "phase")?,
        current_approver: approver
            .map(|r| parse_enum(&r, T, "current_approver"))
            .transpose()?,
        trail: Vec::new(),
        version: get(row, 15, T, "version")?,
        created_at: parse_timestamp(&created, T, "created_at")?,
        updated_at: parse_timestamp(&updated, T, "updated_at")?,
    })
}
