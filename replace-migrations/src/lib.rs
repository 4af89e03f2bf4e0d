//! # replace-migrations
//!
//! Replaces the migration history of a project with a squashed set of
//! migrations that keeps the special operations of the migrations it replaces.
//!
//! This is the meta-crate that re-exports the sub-crates for convenient
//! access. Depend on `replace-migrations` to get everything, or on individual
//! crates for finer-grained control.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::collections::BTreeSet;
//!
//! use replace_migrations::prelude::*;
//!
//! let mut loader = MigrationLoader::new("migrations");
//! let graph = loader.load()?;
//! let apps: BTreeSet<String> = ["billing".to_string()].into();
//! let desired = ProjectState::from_json_file(std::path::Path::new("models.json"))?;
//! let mut questioner = NonInteractiveQuestioner::new(apps.clone(), 1);
//! let changes = replace_all(&graph, &apps, desired, &mut questioner, Some("squashed"))?;
//! assert!(changes.contains_key("billing"));
//! # Ok::<(), ReplaceError>(())
//! ```

/// Settings, app registry, logging, and error types.
pub use replace_migrations_core as core;

/// Migration graph, change detection, and replacement composition.
#[cfg(feature = "engine")]
pub use replace_migrations_engine as engine;

/// Management commands (CLI).
#[cfg(feature = "cli")]
pub use replace_migrations_cli as cli;

// Third-party re-exports
pub use serde;
pub use serde_json;
pub use tracing;

/// Commonly used types, importable with `use replace_migrations::prelude::*`.
pub mod prelude {
    pub use replace_migrations_core::{AppRegistry, ReplaceError, ReplaceResult, Settings};

    #[cfg(feature = "engine")]
    pub use replace_migrations_engine::{
        replace_all, write_migration_files, Migration, MigrationGraph, MigrationLoader,
        NonInteractiveQuestioner, Operation, ProjectState, ReplacementComposer, ReplacementSet,
        WriteOptions,
    };

    #[cfg(feature = "cli")]
    pub use replace_migrations_cli::{register_builtin_commands, CommandRegistry};
}
