//! Applied-migration history of one database.
//!
//! The tool never connects to a database. Each configured database may point
//! to an exported history file: a JSON list of `[app_label, name]` pairs, one
//! per applied migration.

use std::collections::BTreeSet;
use std::path::Path;

use replace_migrations_core::{ReplaceError, ReplaceResult};

use crate::migration::MigrationKey;

/// Tracks which migrations have been applied on one database alias.
#[derive(Debug, Clone, Default)]
pub struct MigrationRecorder {
    alias: String,
    /// Set of applied migration keys.
    applied_migrations: BTreeSet<MigrationKey>,
}

impl MigrationRecorder {
    /// Creates a new empty recorder for a database alias.
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            applied_migrations: BTreeSet::new(),
        }
    }

    /// Reads the applied history of `alias` from an exported history file.
    ///
    /// A missing, unreadable or malformed file means the data store could not
    /// be queried and is reported as [`ReplaceError::OperationalError`].
    pub fn from_history_file(alias: impl Into<String>, path: &Path) -> ReplaceResult<Self> {
        let alias = alias.into();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReplaceError::OperationalError(format!(
                "cannot read migration history '{}' of database '{alias}': {e}",
                path.display()
            ))
        })?;
        let applied: Vec<MigrationKey> = serde_json::from_str(&content).map_err(|e| {
            ReplaceError::OperationalError(format!(
                "malformed migration history '{}' of database '{alias}': {e}",
                path.display()
            ))
        })?;

        let mut recorder = Self::new(alias);
        for key in applied {
            recorder.apply(key);
        }
        Ok(recorder)
    }

    /// Returns the database alias this history belongs to.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Records a migration as applied (in-memory only).
    pub fn apply(&mut self, key: MigrationKey) {
        self.applied_migrations.insert(key);
    }

    /// Records a migration as unapplied (in-memory only).
    pub fn unapply(&mut self, key: &MigrationKey) {
        self.applied_migrations.remove(key);
    }

    /// Returns the set of applied migrations.
    pub fn applied(&self) -> &BTreeSet<MigrationKey> {
        &self.applied_migrations
    }

    /// Returns whether a specific migration has been applied.
    pub fn is_applied(&self, key: &MigrationKey) -> bool {
        self.applied_migrations.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_and_unapply() {
        let mut recorder = MigrationRecorder::new("default");
        let key = ("billing".to_string(), "0001_initial".to_string());
        recorder.apply(key.clone());
        assert!(recorder.is_applied(&key));
        recorder.unapply(&key);
        assert!(!recorder.is_applied(&key));
        assert_eq!(recorder.alias(), "default");
    }

    #[test]
    fn test_from_history_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("applied.json");
        std::fs::write(
            &path,
            r#"[["billing", "0001_initial"], ["billing", "0002_add_status"]]"#,
        )
        .unwrap();

        let recorder = MigrationRecorder::from_history_file("replica", &path).unwrap();
        assert_eq!(recorder.applied().len(), 2);
        assert!(recorder.is_applied(&("billing".into(), "0002_add_status".into())));
    }

    #[test]
    fn test_missing_history_is_operational_error() {
        let dir = tempfile::tempdir().unwrap();
        let err =
            MigrationRecorder::from_history_file("default", &dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ReplaceError::OperationalError(_)));
        assert!(err.is_advisory());
    }

    #[test]
    fn test_malformed_history_is_operational_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("applied.json");
        std::fs::write(&path, r#"{"billing": 1}"#).unwrap();
        let err = MigrationRecorder::from_history_file("default", &path).unwrap_err();
        assert!(matches!(err, ReplaceError::OperationalError(_)));
    }
}
