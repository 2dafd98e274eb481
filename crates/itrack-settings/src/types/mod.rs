//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]`. Sections carry
//! `#[serde(default)]` so partial JSON files are accepted and missing
//! fields get their compiled default.

mod pipeline;
mod server;

pub use pipeline::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 8080 },
///   "pipeline": { "chains": { "sec": ["mentor", "hod", "principal"] } }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItrackSettings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub pipeline: PipelineSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

impl ItrackSettings {
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        if self.auth.jwt_secret.is_empty() {
            return Err(crate::SettingsError::InvalidValue(
                "auth.jwtSecret must not be empty".into(),
            ));
        }
        if self.auth.credential_ttl_secs == 0 {
            return Err(crate::SettingsError::InvalidValue(
                "auth.credentialTtlSecs must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        ItrackSettings::default().validate().unwrap();
    }

    #[test]
    fn empty_secret_rejected() {
        let mut s = ItrackSettings::default();
        s.auth.jwt_secret.clear();
        assert!(s.validate().is_err());
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(ItrackSettings::default()).unwrap();
        assert_eq!(json["server"]["requestTimeoutMs"], 30_000);
        assert_eq!(json["pipeline"]["completionVerifier"], "mentor");
        assert_eq!(json["pipeline"]["chains"]["sec"][0], "mentor");
    }
}
