//! Server, credential, storage and logging settings.

use serde::{Deserialize, Serialize};

/// Development signing secret. Startup warns while it is in use.
pub const DEV_JWT_SECRET: &str = "itrack-development-secret-change-me";

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    pub port: u16,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Upper bound on request bodies, base64 uploads included.
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            request_timeout_ms: 30_000,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Credential signing and verification.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HS256 signing secret.
    pub jwt_secret: String,
    /// `iss` claim written and required on every credential.
    pub issuer: String,
    /// Credential lifetime in seconds. Roles embedded in a credential stay
    /// effective until it expires.
    pub credential_ttl_secs: u64,
    /// Budget for verifying a credential and resolving its principal.
    pub verify_timeout_ms: u64,
    /// Cookie consulted when no `Authorization` header is present.
    pub cookie_name: String,
}

impl AuthSettings {
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            issuer: "itrack".to_string(),
            credential_ttl_secs: 8 * 60 * 60,
            verify_timeout_ms: 2_000,
            cookie_name: "jwt".to_string(),
        }
    }
}

/// Persistence settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Path of the SQLite database. A leading `~/` expands to `$HOME`.
    pub database_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_path: "~/.itrack/database/itrack.db".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive, e.g. `info` or `itrack_pipeline=debug,info`.
    pub level: String,
    /// Persist warn+ events into the `logs` table.
    pub log_to_sqlite: bool,
    /// Database for persisted logs. Defaults to `itrack-logs.db` next to
    /// the storage database.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_database_path: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_sqlite: true,
            log_database_path: None,
        }
    }
}
