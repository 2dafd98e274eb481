//! Student and staff directory.
//!
//! Profile CRUD belongs to the surrounding system; this repo only holds
//! what identity resolution and record creation read.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;
use tracing::instrument;

use itrack_core::ids::PrincipalId;
use itrack_core::ports::{Profile, ProfileDirectory, ProfileKind};
use itrack_core::{PipelineError, Site};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{get, get_opt, parse_enum};

#[derive(Clone)]
pub struct ProfileRepo {
    db: Database,
}

impl ProfileRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(student_id = %id))]
    pub fn upsert_student(
        &self,
        id: &PrincipalId,
        name: &str,
        department: Option<&str>,
        site: Option<Site>,
        mentor_id: Option<&PrincipalId>,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let _ = conn.execute(
                "INSERT INTO students (id, name, department, site, mentor_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name,
                    department = excluded.department, site = excluded.site,
                    mentor_id = excluded.mentor_id",
                rusqlite::params![
                    id.as_str(),
                    name,
                    department,
                    site.map(Site::as_str),
                    mentor_id.map(PrincipalId::as_str),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(staff_id = %id))]
    pub fn upsert_staff(
        &self,
        id: &PrincipalId,
        name: &str,
        department: Option<&str>,
        site: Option<Site>,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let _ = conn.execute(
                "INSERT INTO staff (id, name, department, site, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name,
                    department = excluded.department, site = excluded.site",
                rusqlite::params![
                    id.as_str(),
                    name,
                    department,
                    site.map(Site::as_str),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Look a principal up, students first.
    pub fn find(&self, id: &PrincipalId) -> Result<Option<Profile>, StoreError> {
        self.db.with_conn(|conn| {
            let student = conn
                .query_row(
                    "SELECT name, department, site, mentor_id FROM students WHERE id = ?1",
                    [id.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, Option<String>>(3)?,
                        ))
                    },
                )
                .optional()?;
            if let Some((name, department, site, mentor)) = student {
                return Ok(Some(Profile {
                    id: id.clone(),
                    kind: ProfileKind::Student,
                    name,
                    department,
                    site: parse_site(site)?,
                    mentor_id: mentor.map(PrincipalId::from_raw),
                }));
            }

            let mut stmt =
                conn.prepare("SELECT name, department, site FROM staff WHERE id = ?1")?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => Ok(Some(Profile {
                    id: id.clone(),
                    kind: ProfileKind::Staff,
                    name: get(row, 0, "staff", "name")?,
                    department: get_opt(row, 1, "staff", "department")?,
                    site: parse_site(get_opt(row, 2, "staff", "site")?)?,
                    mentor_id: None,
                })),
                None => Ok(None),
            }
        })
    }
}

fn parse_site(raw: Option<String>) -> Result<Option<Site>, StoreError> {
    raw.map(|s| parse_enum(&s, "profiles", "site")).transpose()
}

#[async_trait]
impl ProfileDirectory for ProfileRepo {
    /// Runs the lookup on the blocking pool so a caller's timeout can
    /// fire while the connection lock is held elsewhere.
    async fn get(&self, id: &PrincipalId) -> Result<Option<Profile>, PipelineError> {
        let repo = self.clone();
        let id = id.clone();
        tokio::task::spawn_blocking(move || repo.find(&id))
            .await
            .map_err(|e| PipelineError::Internal(format!("profile lookup task failed: {e}")))?
            .map_err(PipelineError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn repo() -> ProfileRepo {
        ProfileRepo::new(Database::in_memory().unwrap())
    }

    #[tokio::test]
    async fn student_lookup_includes_mentor() {
        let repo = repo();
        let mentor = PrincipalId::from_raw("m1");
        let s1 = PrincipalId::from_raw("s1");
        repo.upsert_student(&s1, "Asha", Some("cse"), Some(Site::Sec), Some(&mentor))
            .unwrap();

        let p = repo.get(&s1).await.unwrap().unwrap();
        assert_eq!(p.kind, ProfileKind::Student);
        assert_eq!(p.department.as_deref(), Some("cse"));
        assert_eq!(p.site, Some(Site::Sec));
        assert_eq!(p.mentor_id, Some(mentor));
    }

    #[tokio::test]
    async fn staff_lookup() {
        let repo = repo();
        let h = PrincipalId::from_raw("h1");
        repo.upsert_staff(&h, "Dr. Rao", Some("cse"), Some(Site::Sit))
            .unwrap();

        let p = repo.get(&h).await.unwrap().unwrap();
        assert_eq!(p.kind, ProfileKind::Staff);
        assert_eq!(p.site, Some(Site::Sit));
        assert!(p.mentor_id.is_none());
    }

    #[tokio::test]
    async fn unknown_principal_is_none() {
        assert!(repo()
            .get(&PrincipalId::from_raw("ghost"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn lookup_yields_while_connection_is_busy() {
        let db = Database::in_memory().unwrap();
        let repo = ProfileRepo::new(db.clone());
        let s1 = PrincipalId::from_raw("s1");
        repo.upsert_student(&s1, "Asha", Some("cse"), Some(Site::Sec), None)
            .unwrap();

        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            db.with_conn(|_| {
                locked_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(400));
                Ok(())
            })
        });
        locked_rx.recv().unwrap();

        let started = std::time::Instant::now();
        let waited = tokio::time::timeout(Duration::from_millis(50), repo.get(&s1)).await;
        assert!(waited.is_err());
        assert!(started.elapsed() < Duration::from_millis(300));

        holder.join().unwrap().unwrap();
        assert!(repo.get(&s1).await.unwrap().is_some());
    }

    #[test]
    fn upsert_updates_existing() {
        let repo = repo();
        let s = PrincipalId::from_raw("s1");
        repo.upsert_student(&s, "Asha", Some("cse"), Some(Site::Sec), None)
            .unwrap();
        repo.upsert_student(&s, "Asha", Some("ece"), Some(Site::Sec), None)
            .unwrap();
        let p = repo.find(&s).unwrap().unwrap();
        assert_eq!(p.department.as_deref(), Some("ece"));
    }
}
