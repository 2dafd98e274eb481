//! # itrack-telemetry
//!
//! Tracing setup: a JSON stdout layer filtered by `RUST_LOG` or the
//! configured directive, plus an optional layer persisting warn+ events
//! into a SQLite `logs` table keyed by record and actor.

#![deny(unsafe_code)]

mod logging;

pub use logging::{LogQuery, LogRecord, SqliteLogLayer, SqliteLogSink};

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or
    /// `itrack_pipeline=debug,info`.
    pub filter: String,
    /// Per-module level overrides appended to `filter`.
    pub module_levels: Vec<(String, String)>,
    pub log_to_sqlite: bool,
    pub log_db_path: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            module_levels: Vec::new(),
            log_to_sqlite: true,
            log_db_path: dirs_fallback().join("database/itrack-logs.db"),
        }
    }
}

impl TelemetryConfig {
    fn directive(&self) -> String {
        let mut filter = self.filter.clone();
        for (module, level) in &self.module_levels {
            filter.push(',');
            filter.push_str(module);
            filter.push('=');
            filter.push_str(level);
        }
        filter
    }
}

/// Initialize the telemetry subsystem. Call once at startup. Persisted
/// rows are read back through a separate [`SqliteLogSink`] on the same
/// file.
pub fn init_telemetry(config: &TelemetryConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directive()));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_target(true)
        .with_span_list(true)
        .with_filter(env_filter);

    let sqlite_layer = if config.log_to_sqlite {
        match SqliteLogSink::new(&config.log_db_path) {
            Ok(sink) => Some(SqliteLogLayer::new(Arc::new(sink))),
            Err(e) => {
                eprintln!("itrack-telemetry: failed to open log DB: {e}");
                None
            }
        }
    } else {
        None
    };

    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(sqlite_layer)
        .try_init();
}

fn dirs_fallback() -> PathBuf {
    std::env::var("HOME")
        .map_or_else(|_| PathBuf::from("/tmp"), PathBuf::from)
        .join(".itrack")
}
