use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;
use tracing::instrument;

use itrack_core::ids::ArtifactId;
use itrack_core::ports::{Artifact, ArtifactStore};
use itrack_core::PipelineError;

use crate::database::Database;
use crate::error::StoreError;

/// Artifact blobs kept in the `artifacts` table.
pub struct SqliteArtifactStore {
    db: Database,
}

impl SqliteArtifactStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM artifacts", [], |row| row.get(0))
                .map_err(StoreError::from)
        })
    }
}

#[async_trait]
impl ArtifactStore for SqliteArtifactStore {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn save(
        &self,
        bytes: Vec<u8>,
        mime_type: &str,
        logical_name: &str,
    ) -> Result<ArtifactId, PipelineError> {
        let id = ArtifactId::new();
        let size = i64::try_from(bytes.len())
            .map_err(|_| PipelineError::Validation("artifact too large".into()))?;
        self.db.with_conn(|conn| {
            let _ = conn.execute(
                "INSERT INTO artifacts (id, mime_type, logical_name, size_bytes, bytes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    id.as_str(),
                    mime_type,
                    logical_name,
                    size,
                    bytes,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })?;
        Ok(id)
    }

    #[instrument(skip(self), fields(artifact_id = %id))]
    async fn load(&self, id: &ArtifactId) -> Result<Option<Artifact>, PipelineError> {
        let artifact = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT mime_type, logical_name, bytes FROM artifacts WHERE id = ?1",
                [id.as_str()],
                |row| {
                    Ok(Artifact {
                        id: id.clone(),
                        mime_type: row.get(0)?,
                        logical_name: row.get(1)?,
                        bytes: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })?;
        Ok(artifact)
    }

    #[instrument(skip(self), fields(artifact_id = %id))]
    async fn delete(&self, id: &ArtifactId) -> Result<(), PipelineError> {
        self.db.with_conn(|conn| {
            let _ = conn.execute("DELETE FROM artifacts WHERE id = ?1", [id.as_str()])?;
            Ok(())
        })?;
        Ok(())
    }
}
