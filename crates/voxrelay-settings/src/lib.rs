//! # voxrelay-settings
//!
//! Configuration management with layered sources for the voxrelay relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: `~/.voxrelay/settings.json` or `$VOXRELAY_SETTINGS`
//! 3. **Environment variables**: `PORT`, `OPENAI_API_KEY`, `VOXRELAY_*`
//!
//! The binary applies CLI flags on top and then calls
//! [`RelaySettings::validate`]; a missing API key aborts startup.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, deep_merge, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = RelaySettings::default();
        let _path = settings_path();
        let merged = deep_merge(serde_json::json!({"x": 1}), serde_json::json!({"y": 2}));
        assert_eq!(merged["x"], 1);
        assert_eq!(merged["y"], 2);
    }
}
