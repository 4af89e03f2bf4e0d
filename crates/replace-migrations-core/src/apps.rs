//! Installed application registry.
//!
//! The [`AppRegistry`] knows which app labels exist in the project. A
//! replacement run validates every requested label against it before any
//! migration is loaded.

use std::collections::HashMap;

use crate::error::{ReplaceError, ReplaceResult};

/// Configuration for an installed application.
///
/// # Examples
///
/// ```
/// use replace_migrations_core::apps::{AppConfig, InstalledApp};
///
/// let app = InstalledApp::new("project.billing");
/// assert_eq!(app.label(), "billing");
/// ```
pub trait AppConfig: Send + Sync {
    /// Returns the full dotted path of the application.
    fn name(&self) -> &str;

    /// Returns a short label derived from the name (the last component).
    ///
    /// For example, `"project.contrib.billing"` yields `"billing"`.
    fn label(&self) -> &str {
        self.name().rsplit('.').next().unwrap_or_else(|| self.name())
    }
}

/// An app declared by its dotted path in `installed_apps`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledApp {
    name: String,
}

impl InstalledApp {
    /// Creates an installed app from its dotted path.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl AppConfig for InstalledApp {
    fn name(&self) -> &str {
        &self.name
    }
}

/// The registry of installed applications, keyed by label.
pub struct AppRegistry {
    apps: Vec<Box<dyn AppConfig>>,
    app_labels: HashMap<String, usize>,
}

impl Default for AppRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AppRegistry {
    /// Creates a new, empty `AppRegistry`.
    pub fn new() -> Self {
        Self {
            apps: Vec::new(),
            app_labels: HashMap::new(),
        }
    }

    /// Builds a registry from the dotted paths in `installed_apps`.
    pub fn from_installed_apps(installed_apps: &[String]) -> ReplaceResult<Self> {
        let mut registry = Self::new();
        for name in installed_apps {
            registry.register(Box::new(InstalledApp::new(name.clone())))?;
        }
        Ok(registry)
    }

    /// Registers an application.
    ///
    /// Fails with a configuration error when the label is already taken.
    pub fn register(&mut self, app: Box<dyn AppConfig>) -> ReplaceResult<()> {
        let label = app.label().to_string();
        if self.app_labels.contains_key(&label) {
            return Err(ReplaceError::ConfigurationError(format!(
                "Application labels aren't unique, duplicates: {label}"
            )));
        }

        let index = self.apps.len();
        self.app_labels.insert(label, index);
        self.apps.push(app);
        Ok(())
    }

    /// Returns the configuration for the app with the given label, if registered.
    pub fn get_app_config(&self, label: &str) -> Option<&dyn AppConfig> {
        self.app_labels
            .get(label)
            .map(|&idx| self.apps[idx].as_ref())
    }

    /// Returns a slice of all registered app configurations.
    pub fn get_app_configs(&self) -> &[Box<dyn AppConfig>] {
        &self.apps
    }

    /// Returns every registered label in registration order.
    pub fn labels(&self) -> Vec<&str> {
        self.apps.iter().map(|app| app.label()).collect()
    }

    /// Checks that every label is installed.
    ///
    /// All unknown labels are collected (sorted, deduplicated) into a single
    /// [`ReplaceError::UnknownModule`].
    pub fn check_labels<S: AsRef<str>>(&self, labels: &[S]) -> ReplaceResult<()> {
        let mut unknown: Vec<String> = labels
            .iter()
            .map(AsRef::as_ref)
            .filter(|label| self.get_app_config(label).is_none())
            .map(str::to_string)
            .collect();
        if unknown.is_empty() {
            return Ok(());
        }
        unknown.sort();
        unknown.dedup();
        Err(ReplaceError::UnknownModule(unknown))
    }
}
