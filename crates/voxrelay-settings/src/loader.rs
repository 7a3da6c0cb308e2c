//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::RelaySettings;

/// Env var naming an explicit settings file.
pub const SETTINGS_PATH_ENV: &str = "VOXRELAY_SETTINGS";

/// Resolve the settings file path.
///
/// `$VOXRELAY_SETTINGS` if set, else `~/.voxrelay/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(p) = read_env_string(SETTINGS_PATH_ENV) {
        return PathBuf::from(p);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".voxrelay").join("settings.json")
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults plus env overrides. If the
/// file contains invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Defaults with the settings file merged over them, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// - Integers must parse and fall within range
/// - Booleans accept `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are ignored with a warning (file/default wins)
/// - When both a generic and a `VOXRELAY_` name exist, the prefixed one wins
pub fn apply_overrides<F>(settings: &mut RelaySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let string = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    // ── Server ──────────────────────────────────────────────────────
    for name in ["PORT", "VOXRELAY_PORT"] {
        if let Some(raw) = string(name) {
            match parse_u16_range(&raw, 1, 65535) {
                Some(v) => settings.server.port = v,
                None => tracing::warn!(key = name, value = %raw, "invalid port env var, ignoring"),
            }
        }
    }
    if let Some(v) = string("VOXRELAY_HOST") {
        settings.server.host = v;
    }

    // ── Upstream ────────────────────────────────────────────────────
    if let Some(v) = string("OPENAI_API_KEY") {
        settings.upstream.api_key = Some(v);
    }
    for name in ["OPENAI_REALTIME_MODEL", "VOXRELAY_MODEL"] {
        if let Some(v) = string(name) {
            settings.upstream.model = v;
        }
    }
    if let Some(v) = string("VOXRELAY_UPSTREAM_URL") {
        settings.upstream.url = v;
    }

    // ── Admission ───────────────────────────────────────────────────
    if let Some(v) = string("VOXRELAY_ALLOWED_DOMAINS") {
        settings.admission.allowed_domains = parse_list(&v);
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = string("VOXRELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(raw) = string("VOXRELAY_LOG_JSON") {
        match parse_bool(&raw) {
            Some(v) => settings.logging.json = v,
            None => tracing::warn!(key = "VOXRELAY_LOG_JSON", value = %raw, "invalid boolean env var, ignoring"),
        }
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Split a comma-separated list, dropping blanks.
pub fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
