//! Migration file serialization and deserialization.
//!
//! A migration file is a JSON document. Deducible operations and the special
//! operations that need manual review are kept in separate lists, and code
//! references into old migration modules are listed under `manual_porting`
//! instead of `imports`. The loader reads both lists back as one operation
//! sequence, so plain files with a single mixed `operations` list load too.

use std::path::{Path, PathBuf};

use replace_migrations_core::{ReplaceError, ReplaceResult};
use serde::{Deserialize, Serialize};

use crate::classify::{classify, Classification};
use crate::fields::is_false;
use crate::migration::{Migration, MigrationKey};
use crate::operations::Operation;
use crate::portability::PortabilityReport;

/// The name of the marker file created in every app's migrations directory.
pub const PACKAGE_MARKER: &str = ".migrations";

/// The extension of migration files.
pub const MIGRATION_EXTENSION: &str = "json";

const MANUAL_PORTING_INSTRUCTIONS: &str = "Functions from the following migrations need manual \
    copying. Move them and any dependencies into a shared module, then update the RunRust \
    operations to refer to the new location.";

/// Who generated a file, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    /// Tool name and version.
    pub generated_by: String,
    /// Generation time, `YYYY-MM-DD HH:MM` in UTC.
    pub generated_at: String,
}

impl FileHeader {
    /// A header stamped with the current time.
    pub fn now() -> Self {
        Self {
            generated_by: format!("replace-migrations {}", env!("CARGO_PKG_VERSION")),
            generated_at: chrono::Utc::now().format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// Migration modules whose functions must be copied by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualPorting {
    /// What the developer has to do.
    pub instructions: String,
    /// The migration modules, sorted.
    pub migrations: Vec<String>,
}

/// The on-disk representation of a migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<FileHeader>,
    /// Library modules referenced by special operations.
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_porting: Option<ManualPorting>,
    /// Defaults to the name of the directory holding the file.
    #[serde(default)]
    pub app_label: String,
    /// Defaults to the file stem.
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replaces: Vec<MigrationKey>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub initial: bool,
    #[serde(default)]
    pub dependencies: Vec<MigrationKey>,
    /// Deducible operations.
    #[serde(default)]
    pub operations: Vec<Operation>,
    /// Carried side-effecting operations. They must be manually reviewed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub special_operations: Vec<Operation>,
}

impl MigrationFile {
    /// Builds the file contents for `migration`.
    ///
    /// Elidable special operations are not written.
    pub fn from_migration(
        migration: &Migration,
        portability: &PortabilityReport,
        include_header: bool,
    ) -> Self {
        let mut operations = Vec::new();
        let mut special_operations = Vec::new();
        for op in &migration.operations {
            match classify(op) {
                Classification::Deducible => operations.push(op.clone()),
                Classification::Special => special_operations.push(op.clone()),
                Classification::Elidable => {}
            }
        }

        let mut replaces = migration.replaces.clone();
        replaces.sort();
        let mut dependencies = migration.dependencies.clone();
        dependencies.sort();

        let manual_porting = portability.needs_manual_porting().then(|| ManualPorting {
            instructions: MANUAL_PORTING_INSTRUCTIONS.to_string(),
            migrations: portability.migration_imports.clone(),
        });

        Self {
            header: include_header.then(FileHeader::now),
            imports: portability.imports.clone(),
            manual_porting,
            app_label: migration.app_label.clone(),
            name: migration.name.clone(),
            replaces,
            initial: migration.initial,
            dependencies,
            operations,
            special_operations,
        }
    }

    /// Converts the file back into a migration.
    pub fn into_migration(self) -> Migration {
        let mut migration = Migration::new(self.app_label, self.name);
        migration.dependencies = self.dependencies;
        migration.replaces = self.replaces;
        migration.initial = self.initial;
        migration.operations = self.operations;
        migration.operations.extend(self.special_operations);
        migration
    }

    /// Serializes to pretty-printed JSON with a trailing newline.
    pub fn to_json(&self) -> ReplaceResult<String> {
        let mut json = serde_json::to_string_pretty(self).map_err(|e| {
            ReplaceError::SerializationError(format!("Failed to serialize migration: {e}"))
        })?;
        json.push('\n');
        Ok(json)
    }

    /// Deserializes from JSON.
    pub fn from_json(json: &str) -> ReplaceResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            ReplaceError::SerializationError(format!("Failed to deserialize migration: {e}"))
        })
    }

    /// Reads a migration file, taking the app label and name from its location
    /// when the file does not state them.
    pub fn read_from_file(path: &Path) -> ReplaceResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReplaceError::LoadError(format!("Cannot read migration file '{}': {e}", path.display()))
        })?;
        let mut file = Self::from_json(&content).map_err(|e| {
            ReplaceError::LoadError(format!("Invalid migration file '{}': {e}", path.display()))
        })?;

        if file.name.is_empty() {
            file.name = path
                .file_stem()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
        }
        if file.app_label.is_empty() {
            file.app_label = path
                .parent()
                .and_then(Path::file_name)
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
        }
        Ok(file)
    }
}

/// Returns the path where a migration file should be written.
pub fn migration_file_path(migrations_dir: &Path, app_label: &str, name: &str) -> PathBuf {
    migrations_dir
        .join(app_label)
        .join(format!("{name}.{MIGRATION_EXTENSION}"))
}
