//! Error types for replace-migrations.
//!
//! [`ReplaceError`] covers every failure the replacement run can report:
//! validation errors raised before any work starts, history errors found while
//! loading or checking the migration graph, and I/O errors raised while
//! writing files. Each variant maps to a process exit code via
//! [`ReplaceError::exit_code`].

use std::collections::BTreeMap;

use thiserror::Error;

/// The primary error type for replace-migrations.
#[derive(Error, Debug)]
pub enum ReplaceError {
    // ── Validation ───────────────────────────────────────────────────

    /// One or more requested app labels are not installed.
    #[error("{}", unknown_labels_message(.0))]
    UnknownModule(Vec<String>),

    /// The migration name override is not a valid identifier.
    #[error("The migration name must be a valid identifier, got '{0}'.")]
    InvalidName(String),

    // ── History ──────────────────────────────────────────────────────

    /// Some apps have more than one leaf migration.
    ///
    /// Maps each conflicting app label to its sorted leaf names.
    #[error(
        "Conflicting migrations detected; multiple leaf nodes in the migration graph: ({}).\n\
         To fix them run 'makemigrations --merge' first",
        conflicts_message(.0)
    )]
    ConflictingHistory(BTreeMap<String, Vec<String>>),

    /// A migration is recorded as applied before one of its dependencies.
    #[error("Inconsistent migration history: {0}")]
    InconsistentHistory(String),

    /// A migration file is malformed or the graph cannot be built.
    #[error("Migration load error: {0}")]
    LoadError(String),

    /// A data store could not be reached while checking history.
    #[error("Operational error: {0}")]
    OperationalError(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ── Serialization ────────────────────────────────────────────────

    /// An error occurred during serialization or deserialization.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ReplaceError {
    /// Returns the process exit code associated with this error.
    ///
    /// - `UnknownModule` -> 2
    /// - Everything else -> 1
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::UnknownModule(_) => 2,
            Self::InvalidName(_)
            | Self::ConflictingHistory(_)
            | Self::InconsistentHistory(_)
            | Self::LoadError(_)
            | Self::OperationalError(_)
            | Self::ConfigurationError(_)
            | Self::SerializationError(_)
            | Self::IoError(_) => 1,
        }
    }

    /// Returns `true` for errors that are reported as warnings and never
    /// abort a run.
    pub const fn is_advisory(&self) -> bool {
        matches!(
            self,
            Self::InconsistentHistory(_) | Self::OperationalError(_)
        )
    }
}

fn unknown_labels_message(labels: &[String]) -> String {
    labels
        .iter()
        .map(|label| format!("No installed app with label '{label}'."))
        .collect::<Vec<_>>()
        .join("\n")
}

fn conflicts_message(conflicts: &BTreeMap<String, Vec<String>>) -> String {
    conflicts
        .iter()
        .map(|(app, names)| format!("{} in {app}", names.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A convenience type alias for `Result<T, ReplaceError>`.
pub type ReplaceResult<T> = Result<T, ReplaceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ReplaceError::UnknownModule(vec!["x".into()]).exit_code(), 2);
        assert_eq!(ReplaceError::InvalidName("1abc".into()).exit_code(), 1);
        assert_eq!(ReplaceError::LoadError("x".into()).exit_code(), 1);
        assert_eq!(
            ReplaceError::ConflictingHistory(BTreeMap::new()).exit_code(),
            1
        );
    }

    #[test]
    fn test_unknown_module_display() {
        let err = ReplaceError::UnknownModule(vec!["nope".into(), "gone".into()]);
        let msg = err.to_string();
        assert!(msg.contains("No installed app with label 'nope'."));
        assert!(msg.contains("No installed app with label 'gone'."));
    }

    #[test]
    fn test_conflicting_history_display() {
        let mut conflicts = BTreeMap::new();
        conflicts.insert(
            "billing".to_string(),
            vec!["0002_a".to_string(), "0002_b".to_string()],
        );
        conflicts.insert("shop".to_string(), vec!["0003_x".to_string(), "0003_y".to_string()]);
        let msg = ReplaceError::ConflictingHistory(conflicts).to_string();
        assert!(msg.contains("(0002_a, 0002_b in billing; 0003_x, 0003_y in shop)"));
        assert!(msg.contains("--merge"));
    }

    #[test]
    fn test_advisory_errors() {
        assert!(ReplaceError::InconsistentHistory("x".into()).is_advisory());
        assert!(ReplaceError::OperationalError("x".into()).is_advisory());
        assert!(!ReplaceError::LoadError("x".into()).is_advisory());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: ReplaceError = io_err.into();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("file missing"));
    }
}
