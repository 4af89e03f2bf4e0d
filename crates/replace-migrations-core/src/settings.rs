//! Settings for replace-migrations.
//!
//! [`Settings`] holds everything a replacement run needs to know about the
//! project: where migrations live, where the desired model state is
//! described, which apps are installed, and which databases carry an applied
//! migration history. Every field has a default so partial configuration files
//! work.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The engine name of a database that is never checked for history.
pub const DUMMY_ENGINE: &str = "dummy";

/// Database connection configuration.
///
/// Replacement never talks to a live database. A database only contributes
/// its recorded migration history, exported as a JSON list of
/// `[app_label, name]` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// The database engine. [`DUMMY_ENGINE`] disables the history check.
    pub engine: String,
    /// Path to the exported applied-migrations history.
    pub history: Option<PathBuf>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            engine: DUMMY_ENGINE.to_string(),
            history: None,
        }
    }
}

impl DatabaseSettings {
    /// Returns `true` if this database is skipped by the history check.
    pub fn is_dummy(&self) -> bool {
        self.engine == DUMMY_ENGINE
    }
}

/// The complete set of settings.
///
/// # Examples
///
/// ```
/// use replace_migrations_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(!settings.debug);
/// assert_eq!(settings.log_level, "info");
/// assert!(settings.databases["default"].is_dummy());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // ── Core ─────────────────────────────────────────────────────────

    /// Whether debug mode is enabled (pretty, verbose logging).
    pub debug: bool,
    /// The log level filter (e.g. "debug", "info", "warn").
    pub log_level: String,

    // ── Project ──────────────────────────────────────────────────────

    /// Directory holding one sub-directory of migration files per app.
    pub migrations_dir: PathBuf,
    /// JSON file describing the desired project state.
    pub models_file: PathBuf,
    /// Installed application dotted paths. The last segment is the label.
    pub installed_apps: Vec<String>,

    // ── Databases ────────────────────────────────────────────────────

    /// Databases keyed by alias.
    pub databases: BTreeMap<String, DatabaseSettings>,

    // ── Extra ────────────────────────────────────────────────────────

    /// Arbitrary additional settings.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut databases = BTreeMap::new();
        databases.insert("default".to_string(), DatabaseSettings::default());

        Self {
            debug: false,
            log_level: "info".to_string(),
            migrations_dir: PathBuf::from("migrations"),
            models_file: PathBuf::from("models.json"),
            installed_apps: Vec::new(),
            databases,
            extra: HashMap::new(),
        }
    }
}
