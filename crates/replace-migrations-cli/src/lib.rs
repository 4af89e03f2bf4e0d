//! # replace-migrations-cli
//!
//! Management command framework and the `replaceallmigrations` command.
//!
//! This crate provides:
//!
//! - **Management commands** - A framework for defining and registering CLI
//!   commands ([`ManagementCommand`], [`CommandRegistry`])
//! - **`replaceallmigrations`** - Replaces migration histories with squashed
//!   migrations that keep their special operations
//! - **`replace-migrations`** - The binary wiring settings, logging and the
//!   registry together
//!
//! ## Quick Start
//!
//! ```rust
//! use replace_migrations_cli::command::CommandRegistry;
//! use replace_migrations_cli::commands::register_builtin_commands;
//!
//! let mut registry = CommandRegistry::new();
//! register_builtin_commands(&mut registry);
//!
//! assert_eq!(registry.list_commands(), vec!["replaceallmigrations"]);
//! ```

// These clippy lints are intentionally allowed:
// - result_large_err: ReplaceError is the workspace-wide error type
// - doc_markdown: backtick requirements for documentation items are too strict
// - missing_const_for_fn: some functions may gain runtime logic later
// - module_name_repetitions: re-exports make module-prefixed names redundant
#![allow(clippy::result_large_err)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]

pub mod command;
pub mod commands;

// Re-export primary types at the crate root for convenience.
pub use command::{CommandIo, CommandRegistry, ManagementCommand};
pub use commands::{register_builtin_commands, ReplaceAllMigrationsCommand};
