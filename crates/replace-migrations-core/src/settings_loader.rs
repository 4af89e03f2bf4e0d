//! Settings loading from configuration files.
//!
//! This module loads [`Settings`] from TOML files, JSON files, and applies
//! environment variable overrides.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `REPLACE_MIGRATIONS_DEBUG` | `debug` |
//! | `REPLACE_MIGRATIONS_LOG_LEVEL` | `log_level` |
//! | `REPLACE_MIGRATIONS_MIGRATIONS_DIR` | `migrations_dir` |
//! | `REPLACE_MIGRATIONS_MODELS_FILE` | `models_file` |
//! | `REPLACE_MIGRATIONS_INSTALLED_APPS` | `installed_apps` (comma-separated) |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use replace_migrations_core::settings_loader;
//!
//! let settings = settings_loader::from_file_with_env("replace-migrations.toml").unwrap();
//! ```

use std::path::{Path, PathBuf};

use crate::error::ReplaceError;
use crate::settings::Settings;

/// Loads settings from a TOML string.
///
/// Any fields not present in the TOML keep their default values.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, ReplaceError> {
    // Deserialize into a JSON value first and merge it over the defaults so
    // that nested tables only override the keys they mention.
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| ReplaceError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;

    let json_value = toml_to_json(toml_value);
    from_json_value(json_value, "TOML")
}

/// Loads settings from a JSON string.
pub fn from_json_str(json_str: &str) -> Result<Settings, ReplaceError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| ReplaceError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;
    from_json_value(json_value, "JSON")
}

fn from_json_value(value: serde_json::Value, format: &str) -> Result<Settings, ReplaceError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        ReplaceError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        ReplaceError::ConfigurationError(format!(
            "Failed to deserialize settings from {format}: {e}"
        ))
    })
}

/// Loads settings from a TOML or JSON file, chosen by extension.
///
/// Files ending in `.json` are parsed as JSON, everything else as TOML.
pub fn from_file(path: impl AsRef<Path>) -> Result<Settings, ReplaceError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        ReplaceError::ConfigurationError(format!(
            "Failed to read settings file '{}': {e}",
            path.display()
        ))
    })?;
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        from_json_str(&content)
    } else {
        from_toml_str(&content)
    }
}

/// Loads settings from a file and then applies environment variable overrides.
pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Settings, ReplaceError> {
    let mut settings = from_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `REPLACE_MIGRATIONS_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(val) = std::env::var("REPLACE_MIGRATIONS_DEBUG") {
        settings.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Ok(val) = std::env::var("REPLACE_MIGRATIONS_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Ok(val) = std::env::var("REPLACE_MIGRATIONS_MIGRATIONS_DIR") {
        settings.migrations_dir = PathBuf::from(val);
    }

    if let Ok(val) = std::env::var("REPLACE_MIGRATIONS_MODELS_FILE") {
        settings.models_file = PathBuf::from(val);
    }

    if let Ok(val) = std::env::var("REPLACE_MIGRATIONS_INSTALLED_APPS") {
        settings.installed_apps = val
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

// ============================================================
// Helpers
// ============================================================

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}
