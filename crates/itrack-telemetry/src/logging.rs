use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::span;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// A log record persisted to SQLite.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    pub fields: Option<String>,
    pub record_id: Option<String>,
    pub actor_id: Option<String>,
}

/// Query parameters for searching persisted logs.
#[derive(Clone, Debug, Default)]
pub struct LogQuery {
    pub level: Option<String>,
    pub target: Option<String>,
    pub record_id: Option<String>,
    pub actor_id: Option<String>,
    pub since: Option<String>,
    pub limit: Option<u32>,
}

/// SQLite sink that persists warn+ logs.
pub struct SqliteLogSink {
    conn: Mutex<Connection>,
}

impl SqliteLogSink {
    pub fn new(db_path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             CREATE TABLE IF NOT EXISTS logs (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 timestamp TEXT NOT NULL,
                 level TEXT NOT NULL,
                 target TEXT NOT NULL,
                 message TEXT NOT NULL,
                 fields TEXT,
                 record_id TEXT,
                 actor_id TEXT
             );
             CREATE INDEX IF NOT EXISTS idx_logs_level ON logs(level);
             CREATE INDEX IF NOT EXISTS idx_logs_record ON logs(record_id);
             CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn insert(&self, record: &LogInsert) {
        let conn = self.conn.lock();
        let _ = conn.execute(
            "INSERT INTO logs (timestamp, level, target, message, fields, record_id, actor_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                record.timestamp,
                record.level,
                record.target,
                record.message,
                record.fields,
                record.record_id,
                record.actor_id,
            ],
        );
    }

    pub fn query(&self, q: &LogQuery) -> Result<Vec<LogRecord>, rusqlite::Error> {
        let conn = self.conn.lock();
        let mut sql = String::from(
            "SELECT id, timestamp, level, target, message, fields, record_id, actor_id FROM logs WHERE 1=1",
        );
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(level) = &q.level {
            let _ = write!(sql, " AND level = ?{}", params.len() + 1);
            params.push(Box::new(level.clone()));
        }
        if let Some(target) = &q.target {
            let _ = write!(sql, " AND target LIKE ?{}", params.len() + 1);
            params.push(Box::new(format!("%{target}%")));
        }
        if let Some(record_id) = &q.record_id {
            let _ = write!(sql, " AND record_id = ?{}", params.len() + 1);
            params.push(Box::new(record_id.clone()));
        }
        if let Some(actor_id) = &q.actor_id {
            let _ = write!(sql, " AND actor_id = ?{}", params.len() + 1);
            params.push(Box::new(actor_id.clone()));
        }
        if let Some(since) = &q.since {
            let _ = write!(sql, " AND timestamp >= ?{}", params.len() + 1);
            params.push(Box::new(since.clone()));
        }

        let _ = write!(sql, " ORDER BY id DESC LIMIT {}", q.limit.unwrap_or(100));

        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(AsRef::as_ref).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Ok(LogRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                level: row.get(2)?,
                target: row.get(3)?,
                message: row.get(4)?,
                fields: row.get(5)?,
                record_id: row.get(6)?,
                actor_id: row.get(7)?,
            })
        })?;

        rows.collect()
    }

    pub fn count(&self) -> Result<i64, rusqlite::Error> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))
    }
}

struct LogInsert {
    timestamp: String,
    level: String,
    target: String,
    message: String,
    fields: Option<String>,
    record_id: Option<String>,
    actor_id: Option<String>,
}

/// tracing Layer that writes warn+ events to SQLite.
pub struct SqliteLogLayer {
    sink: Arc<SqliteLogSink>,
}

impl SqliteLogLayer {
    pub fn new(sink: Arc<SqliteLogSink>) -> Self {
        Self { sink }
    }
}

/// Pulls `message`, `record_id` and `actor_id` out of an event or span;
/// everything else lands in the JSON `fields` column.
struct FieldVisitor {
    message: Option<String>,
    fields: serde_json::Map<String, serde_json::Value>,
    record_id: Option<String>,
    actor_id: Option<String>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            message: None,
            fields: serde_json::Map::new(),
            record_id: None,
            actor_id: None,
        }
    }

    fn put_str(&mut self, name: &str, value: String) {
        match name {
            "message" => self.message = Some(value),
            "record_id" => self.record_id = Some(value),
            "actor_id" => self.actor_id = Some(value),
            other => {
                let _ = self
                    .fields
                    .insert(other.to_string(), serde_json::Value::String(value));
            }
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let val = format!("{value:?}");
        let val = if field.name() == "message" {
            val
        } else {
            val.trim_matches('"').to_string()
        };
        self.put_str(field.name(), val);
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put_str(field.name(), value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        let _ = self
            .fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        let _ = self
            .fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        let _ = self
            .fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

impl<S> Layer<S> for SqliteLogLayer
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > tracing::Level::WARN {
            return;
        }

        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);

        // Fall back to the enclosing spans for record/actor ids.
        if visitor.record_id.is_none() || visitor.actor_id.is_none() {
            if let Some(scope) = ctx.event_scope(event) {
                for span in scope {
                    let extensions = span.extensions();
                    if let Some(fields) = extensions.get::<SpanFields>() {
                        if visitor.record_id.is_none() {
                            visitor.record_id.clone_from(&fields.record_id);
                        }
                        if visitor.actor_id.is_none() {
                            visitor.actor_id.clone_from(&fields.actor_id);
                        }
                    }
                }
            }
        }

        let fields_json = if visitor.fields.is_empty() {
            None
        } else {
            serde_json::to_string(&visitor.fields).ok()
        };

        let record = LogInsert {
            timestamp: Utc::now().to_rfc3339(),
            level: level.to_string().to_uppercase(),
            target: event.metadata().target().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields: fields_json,
            record_id: visitor.record_id,
            actor_id: visitor.actor_id,
        };

        self.sink.insert(&record);
    }

    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::new();
        attrs.record(&mut visitor);

        if visitor.record_id.is_some() || visitor.actor_id.is_some() {
            if let Some(span) = ctx.span(id) {
                span.extensions_mut().insert(SpanFields {
                    record_id: visitor.record_id,
                    actor_id: visitor.actor_id,
                });
            }
        }
    }
}

struct SpanFields {
    record_id: Option<String>,
    actor_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn sink() -> (tempfile::TempDir, Arc<SqliteLogSink>) {
        let dir = tempfile::tempdir().unwrap();
        let sink = SqliteLogSink::new(&dir.path().join("logs.db")).unwrap();
        (dir, Arc::new(sink))
    }

    fn insert(sink: &SqliteLogSink, level: &str, message: &str, record_id: Option<&str>) {
        sink.insert(&LogInsert {
            timestamp: Utc::now().to_rfc3339(),
            level: level.into(),
            target: "itrack_pipeline::service".into(),
            message: message.into(),
            fields: None,
            record_id: record_id.map(Into::into),
            actor_id: None,
        });
    }

    #[test]
    fn sink_create_and_insert() {
        let (_dir, sink) = sink();
        insert(&sink, "WARN", "approval denied", Some("intern_1"));
        assert_eq!(sink.count().unwrap(), 1);
    }

    #[test]
    fn query_by_level_and_record() {
        let (_dir, sink) = sink();
        insert(&sink, "WARN", "denied", Some("intern_1"));
        insert(&sink, "ERROR", "commit failed", Some("intern_2"));

        let errors = sink
            .query(&LogQuery {
                level: Some("ERROR".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "commit failed");

        let for_record = sink
            .query(&LogQuery {
                record_id: Some("intern_1".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(for_record.len(), 1);
        assert_eq!(for_record[0].message, "denied");
    }

    #[test]
    fn query_limit_newest_first() {
        let (_dir, sink) = sink();
        for i in 0..10 {
            insert(&sink, "WARN", &format!("msg {i}"), None);
        }
        let results = sink
            .query(&LogQuery {
                limit: Some(3),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].message, "msg 9");
    }

    #[test]
    fn layer_persists_warnings_with_span_ids() {
        let (_dir, sink) = sink();
        let subscriber =
            tracing_subscriber::registry().with(SqliteLogLayer::new(Arc::clone(&sink)));
        let record = String::from("intern_9");
        let actor = String::from("usr_3");

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("approve", record_id = %record, actor_id = %actor);
            let _enter = span.enter();
            tracing::info!("ignored below warn");
            tracing::warn!(reason = "scope", "approval denied");
        });

        let rows = sink.query(&LogQuery::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message, "approval denied");
        assert_eq!(rows[0].record_id.as_deref(), Some("intern_9"));
        assert_eq!(rows[0].actor_id.as_deref(), Some("usr_3"));
        assert!(rows[0].fields.as_deref().unwrap().contains("scope"));
    }

    #[test]
    fn event_fields_win_over_span_fields() {
        let (_dir, sink) = sink();
        let subscriber =
            tracing_subscriber::registry().with(SqliteLogLayer::new(Arc::clone(&sink)));
        let actor = String::from("usr_7");

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("amend", record_id = "intern_4", actor_id = "usr_1");
            let _enter = span.enter();
            tracing::warn!(actor_id = %actor, action = "amend", "request denied");
        });

        let rows = sink
            .query(&LogQuery {
                actor_id: Some("usr_7".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record_id.as_deref(), Some("intern_4"));
        assert!(!rows[0].fields.as_deref().unwrap_or_default().contains("usr_7"));
    }
}
