//! # replace-migrations-core
//!
//! Settings, app registry, logging, and error types shared by the
//! replace-migrations crates. This crate has no dependency on the migration
//! engine and provides the foundation for the other crates.
//!
//! ## Modules
//!
//! - [`error`] - The [`ReplaceError`] taxonomy and result alias
//! - [`settings`] - Tool settings with defaults
//! - [`settings_loader`] - Loading settings from TOML, JSON, and the environment
//! - [`apps`] - Installed app registry used to validate app labels
//! - [`logging`] - Tracing-based logging integration

pub mod apps;
pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use apps::{AppConfig, AppRegistry, InstalledApp};
pub use error::{ReplaceError, ReplaceResult};
pub use settings::{DatabaseSettings, Settings};
