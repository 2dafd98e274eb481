//! # itrack-settings
//!
//! Layered configuration for the internship tracking service.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ItrackSettings::default()`]
//! 2. **Settings file**: `~/.itrack/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `ITRACK_*` overrides (highest priority)
//!
//! ```no_run
//! use itrack_settings::get_settings;
//!
//! let settings = get_settings();
//! println!("listening on port {}", settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, expand_home, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<ItrackSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads `~/.itrack/settings.json` with env overrides,
/// falling back to compiled defaults if loading fails.
pub fn get_settings() -> &'static ItrackSettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Initialize the global settings with a specific value.
///
/// Returns the settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: ItrackSettings) -> std::result::Result<(), ItrackSettings> {
    SETTINGS.set(settings)
}
