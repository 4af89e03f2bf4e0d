//! # replace-migrations-engine
//!
//! Replaces the migration history of one or more apps with a freshly computed
//! set of migrations that keeps the side-effecting operations of the old ones.
//!
//! ## Architecture
//!
//! - [`Migration`] is a named set of [`Operation`]s belonging to an app.
//! - [`MigrationGraph`] resolves dependency ordering across apps, and a
//!   [`GraphView`] hides some apps without touching the graph.
//! - [`project_state`] replays a plan into a [`ProjectState`].
//! - [`MigrationAutodetector`] diffs two [`ProjectState`]s behind the
//!   [`ChangeDetector`] trait.
//! - [`ReplacementComposer`] turns the diff into replacement migrations.
//! - [`write_migration_files`] persists them and removes what they replace.
//!
//! ## Module Overview
//!
//! - [`fields`] - Field types and definitions
//! - [`operations`] - Schema and special operations
//! - [`migration`] - `Migration`, `MigrationGraph`, `GraphView`
//! - [`loader`] - `MigrationLoader` for filesystem discovery
//! - [`recorder`] - Applied history per database
//! - [`projector`] - State projection
//! - [`questioner`] - Rename and initial-migration questions
//! - [`autodetect`] - `MigrationAutodetector`, `ProjectState`, `ModelState`
//! - [`classify`] - Deducible / special / elidable classification
//! - [`portability`] - Code references into old migrations
//! - [`replace`] - `ReplacementComposer`
//! - [`serializer`] - On-disk migration format
//! - [`writer`] - `MigrationWriter` and file output

#![allow(clippy::too_many_lines)]
#![allow(clippy::result_large_err)]
#![allow(clippy::format_push_string)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::use_self)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::unnecessary_literal_bound)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::cognitive_complexity)]

pub mod autodetect;
pub mod classify;
pub mod fields;
pub mod loader;
pub mod migration;
pub mod operations;
pub mod portability;
pub mod projector;
pub mod questioner;
pub mod recorder;
pub mod replace;
pub mod serializer;
pub mod writer;

// Re-export key types at the crate root.
pub use autodetect::{
    ChangeDetector, MigrationAutodetector, ModelOptions, ModelState, ProjectState,
};
pub use classify::{carried_operations, classify, Classification};
pub use fields::{FieldDef, FieldType, Index, OnDelete};
pub use loader::MigrationLoader;
pub use migration::{is_valid_migration_name, GraphView, Migration, MigrationGraph, MigrationKey};
pub use operations::{CodePath, Operation, SchemaOperation, SpecialOperation, StateOperation};
pub use portability::PortabilityReport;
pub use projector::{generate_plan, project_state};
pub use questioner::{InteractiveQuestioner, MigrationQuestioner, NonInteractiveQuestioner};
pub use recorder::MigrationRecorder;
pub use replace::{no_changes_message, replace_all, Replacement, ReplacementComposer, ReplacementSet};
pub use serializer::MigrationFile;
pub use writer::{write_migration_files, MigrationWriter, OutputWriter, Superseded, WriteOptions};
