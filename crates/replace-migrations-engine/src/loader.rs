//! Migration loader for discovering migrations from the filesystem.
//!
//! The [`MigrationLoader`] scans a directory structure to find migration files
//! and builds a [`MigrationGraph`] from them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use replace_migrations_core::{ReplaceError, ReplaceResult};

use crate::migration::{Migration, MigrationGraph, MigrationKey};
use crate::serializer::{MigrationFile, MIGRATION_EXTENSION};

/// Discovers and loads migrations from the filesystem.
///
/// The loader expects a directory structure like:
/// ```text
/// migrations_dir/
///   app_label/
///     .migrations
///     0001_initial.json
///     0002_add_field.json
/// ```
///
/// Files without the `json` extension are ignored.
pub struct MigrationLoader {
    /// The base directory containing app migration directories.
    migrations_dir: PathBuf,
    /// Where each discovered migration was read from.
    paths: BTreeMap<MigrationKey, PathBuf>,
}

impl MigrationLoader {
    /// Creates a new loader for the given migrations directory.
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            paths: BTreeMap::new(),
        }
    }

    /// Scans the filesystem for migration files and builds a graph.
    ///
    /// Fails with [`ReplaceError::LoadError`] on malformed files, unresolved
    /// dependencies within tracked apps, or cycles.
    pub fn load(&mut self) -> ReplaceResult<MigrationGraph> {
        let migrations = self.load_disk()?;
        let graph = MigrationGraph::from_migrations(migrations)?;
        tracing::debug!(
            "Loaded {} migration(s) for {} app(s) from {}",
            graph.len(),
            graph.app_labels().len(),
            self.migrations_dir.display()
        );
        Ok(graph)
    }

    /// Reads every migration file without building a graph.
    pub fn load_disk(&mut self) -> ReplaceResult<Vec<Migration>> {
        self.paths.clear();

        let dir = &self.migrations_dir;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(dir).map_err(|e| {
            ReplaceError::LoadError(format!(
                "Cannot read migrations directory '{}': {e}",
                dir.display()
            ))
        })?;

        let mut app_dirs = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                app_dirs.push(path);
            }
        }
        app_dirs.sort();

        let mut migrations = Vec::new();
        for app_dir in app_dirs {
            migrations.extend(self.load_app(&app_dir)?);
        }
        Ok(migrations)
    }

    fn load_app(&mut self, app_dir: &Path) -> ReplaceResult<Vec<Migration>> {
        let entries = std::fs::read_dir(app_dir).map_err(|e| {
            ReplaceError::LoadError(format!(
                "Cannot read app directory '{}': {e}",
                app_dir.display()
            ))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(MIGRATION_EXTENSION)
            {
                files.push(path);
            }
        }
        files.sort();

        let mut migrations = Vec::with_capacity(files.len());
        for path in files {
            let migration = MigrationFile::read_from_file(&path)?.into_migration();
            if migration.name.is_empty() || migration.app_label.is_empty() {
                continue;
            }
            self.paths.insert(migration.key(), path);
            migrations.push(migration);
        }
        Ok(migrations)
    }

    /// Returns the path a loaded migration was read from.
    pub fn path_of(&self, key: &MigrationKey) -> Option<&Path> {
        self.paths.get(key).map(PathBuf::as_path)
    }

    /// Returns the files of every loaded migration.
    pub fn paths(&self) -> &BTreeMap<MigrationKey, PathBuf> {
        &self.paths
    }

    /// Returns the migrations directory.
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }
}
