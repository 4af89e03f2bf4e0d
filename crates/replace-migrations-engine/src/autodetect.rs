//! Migration auto-detection by comparing project states.
//!
//! The [`MigrationAutodetector`] compares a "from" [`ProjectState`] against a
//! "to" [`ProjectState`] and proposes the migrations needed to turn one into
//! the other. [`ChangeDetector`] is the seam the replacement composer calls
//! through, so a different diff engine can be plugged in.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use replace_migrations_core::{ReplaceError, ReplaceResult};
use serde::{Deserialize, Serialize};

use crate::fields::{FieldDef, Index, RelationTarget};
use crate::migration::{Migration, MigrationGraph, MigrationKey, SETTING_SENTINEL};
use crate::operations::{
    AddField, AddIndex, AlterField, AlterUniqueTogether, CreateModel, DeleteModel, Operation,
    RemoveField, RemoveIndex, RenameField, SchemaOperation,
};
use crate::questioner::MigrationQuestioner;

/// Suggested name fragments longer than this are truncated.
const MAX_NAME_SUFFIX: usize = 100;

// ============================================================
// Project state
// ============================================================

/// A snapshot of the entire project's model state at a point in time.
///
/// Contains all models across all apps, keyed by `(app_label, model_name)`
/// with the model name lowercased. Serialized as a plain list of models.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<ModelState>", into = "Vec<ModelState>")]
pub struct ProjectState {
    /// All models in the project.
    pub models: BTreeMap<(String, String), ModelState>,
}

impl ProjectState {
    /// Creates a new empty project state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a project state from a JSON file holding a list of models.
    pub fn from_json_file(path: &Path) -> ReplaceResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReplaceError::ConfigurationError(format!(
                "Cannot read models file '{}': {e}",
                path.display()
            ))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            ReplaceError::SerializationError(format!(
                "Invalid models file '{}': {e}",
                path.display()
            ))
        })
    }

    fn key(app_label: &str, model_name: &str) -> (String, String) {
        (app_label.to_string(), model_name.to_lowercase())
    }

    /// Adds a model to this project state, replacing any model with the same name.
    pub fn add_model(&mut self, model: ModelState) {
        self.models
            .insert(Self::key(&model.app_label, &model.name), model);
    }

    /// Removes a model from this project state.
    pub fn remove_model(&mut self, app_label: &str, model_name: &str) -> Option<ModelState> {
        self.models.remove(&Self::key(app_label, model_name))
    }

    /// Returns a model by app label and (case-insensitive) name.
    pub fn get_model(&self, app_label: &str, model_name: &str) -> Option<&ModelState> {
        self.models.get(&Self::key(app_label, model_name))
    }

    /// Returns a mutable model by app label and (case-insensitive) name.
    pub fn get_model_mut(&mut self, app_label: &str, model_name: &str) -> Option<&mut ModelState> {
        self.models.get_mut(&Self::key(app_label, model_name))
    }

    /// Returns whether any model of `app_label` exists.
    pub fn has_app(&self, app_label: &str) -> bool {
        self.models.keys().any(|(app, _)| app == app_label)
    }

    /// Returns the labels of every app with at least one model.
    pub fn app_labels(&self) -> BTreeSet<String> {
        self.models.keys().map(|(app, _)| app.clone()).collect()
    }

    /// Returns the number of models.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Returns whether the state holds no model.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl From<Vec<ModelState>> for ProjectState {
    fn from(models: Vec<ModelState>) -> Self {
        let mut state = Self::new();
        for model in models {
            state.add_model(model);
        }
        state
    }
}

impl From<ProjectState> for Vec<ModelState> {
    fn from(state: ProjectState) -> Self {
        state.models.into_values().collect()
    }
}

/// Model-level options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOptions {
    /// The explicit database table name, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_table: Option<String>,
    /// Sets of fields that must be unique together.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique_together: Vec<Vec<String>>,
    /// Database indexes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<Index>,
}

impl ModelOptions {
    /// Returns whether every option has its default value.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// The state of a single model at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    /// The application label this model belongs to.
    pub app_label: String,
    /// The model name.
    pub name: String,
    /// The fields of this model, in declaration order.
    pub fields: Vec<FieldDef>,
    /// Model-level options.
    #[serde(default, skip_serializing_if = "ModelOptions::is_empty")]
    pub options: ModelOptions,
}

impl ModelState {
    /// Creates a new model state.
    pub fn new(
        app_label: impl Into<String>,
        name: impl Into<String>,
        fields: Vec<FieldDef>,
    ) -> Self {
        Self {
            app_label: app_label.into(),
            name: name.into(),
            fields,
            options: ModelOptions::default(),
        }
    }

    /// Sets model options.
    pub fn with_options(mut self, options: ModelOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the database table name for this model.
    pub fn db_table(&self) -> String {
        self.options
            .db_table
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.app_label, self.name.to_lowercase()))
    }
}

// ============================================================
// Change detection
// ============================================================

/// Proposes new migrations for the difference between two states.
pub trait ChangeDetector {
    /// Returns the proposed migrations per app label.
    ///
    /// - `trim_to_apps` keeps only these apps and the apps they depend on.
    /// - `convert_apps` are apps that get an initial migration even when
    ///   they have no migration yet.
    /// - `migration_name` overrides the suggested name suffix.
    fn changes(
        &self,
        graph: &MigrationGraph,
        trim_to_apps: Option<&BTreeSet<String>>,
        convert_apps: Option<&BTreeSet<String>>,
        migration_name: Option<&str>,
        questioner: &mut dyn MigrationQuestioner,
    ) -> BTreeMap<String, Vec<Migration>>;
}

/// Compares two [`ProjectState`]s and generates migrations.
///
/// The autodetector detects:
/// - New models (creates `CreateModel`)
/// - Deleted models (creates `DeleteModel`)
/// - Added fields (creates `AddField`)
/// - Removed fields (creates `RemoveField`)
/// - Altered fields (creates `AlterField`)
/// - Renamed fields (same shape, one removed + one added, confirmed by the questioner)
/// - Changed `unique_together` (creates `AlterUniqueTogether`)
/// - Added/removed indexes (creates `AddIndex` / `RemoveIndex`)
///
/// Output is ordered by app, then model, then field.
pub struct MigrationAutodetector {
    /// The old project state (before changes).
    pub from_state: ProjectState,
    /// The new project state (after changes).
    pub to_state: ProjectState,
}

/// Operations for one app plus the apps and settings they reference.
#[derive(Debug, Default)]
struct AppChanges {
    operations: Vec<Operation>,
    app_dependencies: BTreeSet<String>,
    setting_dependencies: BTreeSet<String>,
}

impl AppChanges {
    fn push(&mut self, app_label: &str, op: SchemaOperation) {
        for field in op.fields() {
            if let Some(reference) = field.field_type.related_model() {
                match RelationTarget::parse(reference, app_label) {
                    RelationTarget::Setting(name) => {
                        self.setting_dependencies.insert(name.to_string());
                    }
                    RelationTarget::Model {
                        app_label: target, ..
                    } if target != app_label => {
                        self.app_dependencies.insert(target.to_string());
                    }
                    RelationTarget::Model { .. } => {}
                }
            }
        }
        self.operations.push(Operation::Schema(op));
    }
}

impl MigrationAutodetector {
    /// Creates a new autodetector with from and to states.
    pub fn new(from_state: ProjectState, to_state: ProjectState) -> Self {
        Self {
            from_state,
            to_state,
        }
    }

    /// Detects differences between the two states and returns operations
    /// grouped by app label.
    pub fn detect_changes(
        &self,
        questioner: &mut dyn MigrationQuestioner,
    ) -> BTreeMap<String, Vec<Operation>> {
        self.detect(questioner)
            .into_iter()
            .map(|(app, changes)| (app, changes.operations))
            .collect()
    }

    fn detect(&self, questioner: &mut dyn MigrationQuestioner) -> BTreeMap<String, AppChanges> {
        let mut result: BTreeMap<String, AppChanges> = BTreeMap::new();

        // 1. New models
        for (key, model) in &self.to_state.models {
            if !self.from_state.models.contains_key(key) {
                result.entry(key.0.clone()).or_default().push(
                    &key.0,
                    SchemaOperation::CreateModel(CreateModel {
                        name: model.name.clone(),
                        fields: model.fields.clone(),
                        options: model.options.clone(),
                    }),
                );
            }
        }

        // 2. Changes to models present in both states
        for (key, new_model) in &self.to_state.models {
            if let Some(old_model) = self.from_state.models.get(key) {
                let app = result.entry(key.0.clone()).or_default();
                detect_model_changes(&key.0, old_model, new_model, app, questioner);
            }
        }

        // 3. Deleted models
        for (key, model) in &self.from_state.models {
            if !self.to_state.models.contains_key(key) {
                result.entry(key.0.clone()).or_default().push(
                    &key.0,
                    SchemaOperation::DeleteModel(DeleteModel {
                        name: model.name.clone(),
                    }),
                );
            }
        }

        result.retain(|_, changes| !changes.operations.is_empty());
        result
    }

    /// Numbers and names the proposed migrations against the existing graph.
    ///
    /// Apps without migrations are dropped unless listed in `convert_apps`
    /// or approved by [`MigrationQuestioner::ask_initial`].
    fn arrange_for_graph(
        &self,
        detected: BTreeMap<String, AppChanges>,
        graph: &MigrationGraph,
        convert_apps: Option<&BTreeSet<String>>,
        migration_name: Option<&str>,
        questioner: &mut dyn MigrationQuestioner,
    ) -> BTreeMap<String, Vec<Migration>> {
        let mut arranged: BTreeMap<String, (Migration, BTreeSet<String>)> = BTreeMap::new();

        for (app_label, changes) in detected {
            let app_leaf = graph.app_leaf_nodes(&app_label).into_iter().next();
            let convert = convert_apps.is_some_and(|apps| apps.contains(&app_label));
            if app_leaf.is_none() && !convert && !questioner.ask_initial(&app_label) {
                tracing::debug!("Skipping '{app_label}': no migrations and not converted");
                continue;
            }

            let next_number = app_leaf
                .as_ref()
                .map_or(1, |leaf| parse_number(&leaf.1).unwrap_or(0) + 1);

            let mut migration = Migration::new(app_label.clone(), String::new());
            migration.operations = changes.operations;
            migration.initial = !self.from_state.has_app(&app_label);
            if let Some(leaf) = &app_leaf {
                migration.dependencies.push(leaf.clone());
            }
            for setting in changes.setting_dependencies {
                migration
                    .dependencies
                    .push((SETTING_SENTINEL.to_string(), setting));
            }

            let suffix = match migration_name {
                Some(name) => name.to_string(),
                None if app_leaf.is_none() => "initial".to_string(),
                None => migration.suggest_name().chars().take(MAX_NAME_SUFFIX).collect(),
            };
            migration.name = format!("{next_number:04}_{suffix}");

            arranged.insert(app_label, (migration, changes.app_dependencies));
        }

        let new_keys: BTreeMap<String, MigrationKey> = arranged
            .iter()
            .map(|(app, (migration, _))| (app.clone(), migration.key()))
            .collect();

        arranged
            .into_iter()
            .map(|(app_label, (mut migration, app_dependencies))| {
                for target in app_dependencies {
                    let dependency = new_keys
                        .get(&target)
                        .cloned()
                        .or_else(|| graph.app_leaf_nodes(&target).into_iter().next());
                    match dependency {
                        Some(key) if !migration.dependencies.contains(&key) => {
                            migration.dependencies.push(key);
                        }
                        Some(_) => {}
                        None => tracing::debug!(
                            "'{app_label}' references '{target}', which has no migrations"
                        ),
                    }
                }
                (app_label, vec![migration])
            })
            .collect()
    }
}

impl ChangeDetector for MigrationAutodetector {
    fn changes(
        &self,
        graph: &MigrationGraph,
        trim_to_apps: Option<&BTreeSet<String>>,
        convert_apps: Option<&BTreeSet<String>>,
        migration_name: Option<&str>,
        questioner: &mut dyn MigrationQuestioner,
    ) -> BTreeMap<String, Vec<Migration>> {
        let detected = self.detect(questioner);
        let mut changes =
            self.arrange_for_graph(detected, graph, convert_apps, migration_name, questioner);
        if let Some(apps) = trim_to_apps {
            trim_to_apps_with_dependencies(&mut changes, apps);
        }
        changes
    }
}

/// Removes every app that is neither requested nor depended upon by a
/// requested app, transitively.
fn trim_to_apps_with_dependencies(
    changes: &mut BTreeMap<String, Vec<Migration>>,
    app_labels: &BTreeSet<String>,
) {
    let app_dependencies: BTreeMap<&String, BTreeSet<String>> = changes
        .iter()
        .map(|(app, migrations)| {
            let deps = migrations
                .iter()
                .flat_map(|m| m.dependencies.iter().map(|(dep_app, _)| dep_app.clone()))
                .collect();
            (app, deps)
        })
        .collect();

    let mut required: BTreeSet<String> = app_labels.clone();
    loop {
        let before = required.len();
        let extra: Vec<String> = required
            .iter()
            .filter_map(|app| app_dependencies.get(app))
            .flatten()
            .cloned()
            .collect();
        required.extend(extra);
        if required.len() == before {
            break;
        }
    }

    changes.retain(|app, _| required.contains(app));
}

fn detect_model_changes(
    app_label: &str,
    old_model: &ModelState,
    new_model: &ModelState,
    changes: &mut AppChanges,
    questioner: &mut dyn MigrationQuestioner,
) {
    let model_name = new_model.name.clone();

    let mut removed: Vec<&FieldDef> = old_model
        .fields
        .iter()
        .filter(|f| new_model.get_field(&f.name).is_none())
        .collect();
    let added: Vec<&FieldDef> = new_model
        .fields
        .iter()
        .filter(|f| old_model.get_field(&f.name).is_none())
        .collect();

    // Renames: an added field with the same shape as a removed one
    let mut really_added: Vec<&FieldDef> = Vec::new();
    for new_field in added {
        let candidate = removed.iter().position(|old_field| {
            old_field.same_shape(new_field)
                && questioner.ask_rename(
                    &model_name,
                    &old_field.name,
                    &new_field.name,
                    new_field.field_type.type_name(),
                )
        });
        match candidate {
            Some(index) => {
                let old_field = removed.remove(index);
                changes.push(
                    app_label,
                    SchemaOperation::RenameField(RenameField {
                        model_name: model_name.clone(),
                        old_name: old_field.name.clone(),
                        new_name: new_field.name.clone(),
                    }),
                );
                if old_field.db_column != new_field.db_column {
                    changes.push(
                        app_label,
                        SchemaOperation::AlterField(AlterField {
                            model_name: model_name.clone(),
                            name: new_field.name.clone(),
                            field: new_field.clone(),
                        }),
                    );
                }
            }
            None => really_added.push(new_field),
        }
    }

    for field in really_added {
        changes.push(
            app_label,
            SchemaOperation::AddField(AddField {
                model_name: model_name.clone(),
                field: field.clone(),
            }),
        );
    }

    for field in removed {
        changes.push(
            app_label,
            SchemaOperation::RemoveField(RemoveField {
                model_name: model_name.clone(),
                name: field.name.clone(),
            }),
        );
    }

    for new_field in &new_model.fields {
        if let Some(old_field) = old_model.get_field(&new_field.name) {
            if old_field != new_field {
                changes.push(
                    app_label,
                    SchemaOperation::AlterField(AlterField {
                        model_name: model_name.clone(),
                        name: new_field.name.clone(),
                        field: new_field.clone(),
                    }),
                );
            }
        }
    }

    if old_model.options.unique_together != new_model.options.unique_together {
        changes.push(
            app_label,
            SchemaOperation::AlterUniqueTogether(AlterUniqueTogether {
                model_name: model_name.clone(),
                unique_together: new_model.options.unique_together.clone(),
            }),
        );
    }

    // An index whose definition changed is dropped and recreated.
    for old_index in &old_model.options.indexes {
        if !new_model.options.indexes.contains(old_index) {
            changes.push(
                app_label,
                SchemaOperation::RemoveIndex(RemoveIndex {
                    model_name: model_name.clone(),
                    name: old_index.name.clone(),
                }),
            );
        }
    }
    for new_index in &new_model.options.indexes {
        if !old_model.options.indexes.contains(new_index) {
            changes.push(
                app_label,
                SchemaOperation::AddIndex(AddIndex {
                    model_name: model_name.clone(),
                    index: new_index.clone(),
                }),
            );
        }
    }
}

/// Extracts the number in front of `_squashed_` in a migration name.
///
/// `"0001_squashed_0004_auto"` yields `Some(1)`. Names that are not squashed
/// yield `None`.
pub fn parse_number(name: &str) -> Option<u32> {
    static SQUASHED: OnceLock<Regex> = OnceLock::new();
    let squashed = SQUASHED.get_or_init(|| Regex::new(r"(\d+)_squashed_.*").unwrap());
    squashed
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
