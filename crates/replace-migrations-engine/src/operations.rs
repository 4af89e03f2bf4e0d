//! Migration operations.
//!
//! Operations come in two capability sets. A [`SchemaOperation`] is deducible:
//! its whole effect is a change of [`ProjectState`], so a fresh diff between
//! two states can always reproduce it. A [`SpecialOperation`] runs SQL or code
//! (or deliberately splits database and state effects) and cannot be derived
//! from a state diff. [`Operation`] is the tagged union of both, and
//! [`Operation::kind`] is the single place where the capability is matched.

use std::fmt;

use replace_migrations_core::ReplaceError;
use serde::{Deserialize, Serialize};

use crate::autodetect::{ModelOptions, ModelState, ProjectState};
use crate::fields::{FieldDef, Index};

/// Behavior shared by every operation.
pub trait StateOperation {
    /// Returns a human-readable description of this operation.
    fn describe(&self) -> String;

    /// Applies this operation to the in-memory project state.
    fn state_forwards(&self, app_label: &str, state: &mut ProjectState);

    /// Returns a short name fragment used to suggest migration names.
    fn migration_name_fragment(&self) -> Option<String> {
        None
    }
}

// ============================================================
// Schema operations
// ============================================================

/// Creates a new model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateModel {
    /// The model name.
    pub name: String,
    /// The fields of the new model.
    pub fields: Vec<FieldDef>,
    /// Model-level options (indexes, unique_together, etc.).
    #[serde(default, skip_serializing_if = "ModelOptions::is_empty")]
    pub options: ModelOptions,
}

impl StateOperation for CreateModel {
    fn describe(&self) -> String {
        format!("Create model {}", self.name)
    }

    fn state_forwards(&self, app_label: &str, state: &mut ProjectState) {
        state.add_model(
            ModelState::new(app_label, self.name.clone(), self.fields.clone())
                .with_options(self.options.clone()),
        );
    }

    fn migration_name_fragment(&self) -> Option<String> {
        Some(self.name.to_lowercase())
    }
}

/// Deletes a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteModel {
    /// The model name.
    pub name: String,
}

impl StateOperation for DeleteModel {
    fn describe(&self) -> String {
        format!("Delete model {}", self.name)
    }

    fn state_forwards(&self, app_label: &str, state: &mut ProjectState) {
        state.remove_model(app_label, &self.name);
    }

    fn migration_name_fragment(&self) -> Option<String> {
        Some(format!("delete_{}", self.name.to_lowercase()))
    }
}

/// Adds a field to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddField {
    /// The model name.
    pub model_name: String,
    /// The new field.
    pub field: FieldDef,
}

impl StateOperation for AddField {
    fn describe(&self) -> String {
        format!("Add field {} to {}", self.field.name, self.model_name)
    }

    fn state_forwards(&self, app_label: &str, state: &mut ProjectState) {
        if let Some(model) = state.get_model_mut(app_label, &self.model_name) {
            model.fields.push(self.field.clone());
        }
    }

    fn migration_name_fragment(&self) -> Option<String> {
        Some(format!(
            "{}_{}",
            self.model_name.to_lowercase(),
            self.field.name.to_lowercase()
        ))
    }
}

/// Removes a field from a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveField {
    /// The model name.
    pub model_name: String,
    /// The field name.
    pub name: String,
}

impl StateOperation for RemoveField {
    fn describe(&self) -> String {
        format!("Remove field {} from {}", self.name, self.model_name)
    }

    fn state_forwards(&self, app_label: &str, state: &mut ProjectState) {
        if let Some(model) = state.get_model_mut(app_label, &self.model_name) {
            model.fields.retain(|f| f.name != self.name);
        }
    }

    fn migration_name_fragment(&self) -> Option<String> {
        Some(format!(
            "remove_{}_{}",
            self.model_name.to_lowercase(),
            self.name.to_lowercase()
        ))
    }
}

/// Replaces the definition of an existing field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlterField {
    /// The model name.
    pub model_name: String,
    /// The field name.
    pub name: String,
    /// The new field definition.
    pub field: FieldDef,
}

impl StateOperation for AlterField {
    fn describe(&self) -> String {
        format!("Alter field {} on {}", self.name, self.model_name)
    }

    fn state_forwards(&self, app_label: &str, state: &mut ProjectState) {
        if let Some(model) = state.get_model_mut(app_label, &self.model_name) {
            if let Some(f) = model.fields.iter_mut().find(|f| f.name == self.name) {
                *f = self.field.clone();
            }
        }
    }

    fn migration_name_fragment(&self) -> Option<String> {
        Some(format!(
            "alter_{}_{}",
            self.model_name.to_lowercase(),
            self.name.to_lowercase()
        ))
    }
}

/// Renames a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameField {
    /// The model name.
    pub model_name: String,
    /// The old field name.
    pub old_name: String,
    /// The new field name.
    pub new_name: String,
}

impl StateOperation for RenameField {
    fn describe(&self) -> String {
        format!(
            "Rename field {} on {} to {}",
            self.old_name, self.model_name, self.new_name
        )
    }

    fn state_forwards(&self, app_label: &str, state: &mut ProjectState) {
        if let Some(model) = state.get_model_mut(app_label, &self.model_name) {
            if let Some(f) = model.fields.iter_mut().find(|f| f.name == self.old_name) {
                f.name.clone_from(&self.new_name);
            }
            for group in &mut model.options.unique_together {
                for field in group.iter_mut() {
                    if *field == self.old_name {
                        field.clone_from(&self.new_name);
                    }
                }
            }
            for index in &mut model.options.indexes {
                for field in &mut index.fields {
                    if *field == self.old_name {
                        field.clone_from(&self.new_name);
                    }
                }
            }
        }
    }

    fn migration_name_fragment(&self) -> Option<String> {
        Some(format!(
            "rename_{}_{}_{}",
            self.old_name.to_lowercase(),
            self.model_name.to_lowercase(),
            self.new_name.to_lowercase()
        ))
    }
}

/// Adds an index to a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddIndex {
    /// The model name.
    pub model_name: String,
    /// The index definition.
    pub index: Index,
}

impl StateOperation for AddIndex {
    fn describe(&self) -> String {
        format!(
            "Create index {} on field(s) {} of model {}",
            self.index.name,
            self.index.fields.join(", "),
            self.model_name
        )
    }

    fn state_forwards(&self, app_label: &str, state: &mut ProjectState) {
        if let Some(model) = state.get_model_mut(app_label, &self.model_name) {
            model.options.indexes.push(self.index.clone());
        }
    }

    fn migration_name_fragment(&self) -> Option<String> {
        Some(format!(
            "{}_{}",
            self.model_name.to_lowercase(),
            self.index.name.to_lowercase()
        ))
    }
}

/// Removes an index from a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveIndex {
    /// The model name.
    pub model_name: String,
    /// The index name.
    pub name: String,
}

impl StateOperation for RemoveIndex {
    fn describe(&self) -> String {
        format!("Remove index {} from {}", self.name, self.model_name)
    }

    fn state_forwards(&self, app_label: &str, state: &mut ProjectState) {
        if let Some(model) = state.get_model_mut(app_label, &self.model_name) {
            model.options.indexes.retain(|i| i.name != self.name);
        }
    }

    fn migration_name_fragment(&self) -> Option<String> {
        Some(format!(
            "remove_{}_{}",
            self.model_name.to_lowercase(),
            self.name.to_lowercase()
        ))
    }
}

/// Replaces the `unique_together` groups of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlterUniqueTogether {
    /// The model name.
    pub model_name: String,
    /// The new unique_together groups.
    pub unique_together: Vec<Vec<String>>,
}

impl StateOperation for AlterUniqueTogether {
    fn describe(&self) -> String {
        format!(
            "Alter unique_together for {} ({} constraint(s))",
            self.model_name,
            self.unique_together.len()
        )
    }

    fn state_forwards(&self, app_label: &str, state: &mut ProjectState) {
        if let Some(model) = state.get_model_mut(app_label, &self.model_name) {
            model.options.unique_together.clone_from(&self.unique_together);
        }
    }

    fn migration_name_fragment(&self) -> Option<String> {
        Some(format!(
            "alter_{}_unique_together",
            self.model_name.to_lowercase()
        ))
    }
}

// ============================================================
// Special operations
// ============================================================

/// Runs raw SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSQL {
    /// Forward SQL.
    pub sql: String,
    /// Backward SQL, if the operation is reversible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse_sql: Option<String>,
    /// Whether the operation may be dropped when squashing.
    #[serde(default)]
    pub elidable: bool,
}

impl StateOperation for RunSQL {
    fn describe(&self) -> String {
        "Raw SQL operation".to_string()
    }

    fn state_forwards(&self, _app_label: &str, _state: &mut ProjectState) {}
}

/// Runs a Rust function referenced by its path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRust {
    /// The forward function.
    pub code: CodePath,
    /// The backward function, if the operation is reversible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse_code: Option<CodePath>,
    /// Whether the operation may be dropped when squashing.
    #[serde(default)]
    pub elidable: bool,
}

impl StateOperation for RunRust {
    fn describe(&self) -> String {
        "Raw Rust operation".to_string()
    }

    fn state_forwards(&self, _app_label: &str, _state: &mut ProjectState) {}
}

/// Applies different operations to the database and to the project state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeparateDatabaseAndState {
    /// Operations applied to the project state only.
    #[serde(default)]
    pub state_operations: Vec<Operation>,
    /// Operations applied to the database only.
    #[serde(default)]
    pub database_operations: Vec<Operation>,
    /// Whether the operation may be dropped when squashing.
    #[serde(default)]
    pub elidable: bool,
}

impl StateOperation for SeparateDatabaseAndState {
    fn describe(&self) -> String {
        "Custom state/database change combination".to_string()
    }

    fn state_forwards(&self, app_label: &str, state: &mut ProjectState) {
        for op in &self.state_operations {
            op.state_forwards(app_label, state);
        }
    }
}

// ============================================================
// Tagged unions
// ============================================================

/// A deducible operation: its effect is fully captured by project state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SchemaOperation {
    CreateModel(CreateModel),
    DeleteModel(DeleteModel),
    AddField(AddField),
    RemoveField(RemoveField),
    AlterField(AlterField),
    RenameField(RenameField),
    AddIndex(AddIndex),
    RemoveIndex(RemoveIndex),
    AlterUniqueTogether(AlterUniqueTogether),
}

impl SchemaOperation {
    fn inner(&self) -> &dyn StateOperation {
        match self {
            Self::CreateModel(op) => op,
            Self::DeleteModel(op) => op,
            Self::AddField(op) => op,
            Self::RemoveField(op) => op,
            Self::AlterField(op) => op,
            Self::RenameField(op) => op,
            Self::AddIndex(op) => op,
            Self::RemoveIndex(op) => op,
            Self::AlterUniqueTogether(op) => op,
        }
    }

    /// Returns the fields this operation introduces or redefines.
    pub fn fields(&self) -> Vec<&FieldDef> {
        match self {
            Self::CreateModel(op) => op.fields.iter().collect(),
            Self::AddField(AddField { field, .. }) | Self::AlterField(AlterField { field, .. }) => {
                vec![field]
            }
            _ => Vec::new(),
        }
    }
}

/// An operation whose effect cannot be derived from a state diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SpecialOperation {
    RunSQL(RunSQL),
    RunRust(RunRust),
    SeparateDatabaseAndState(SeparateDatabaseAndState),
}

impl SpecialOperation {
    fn inner(&self) -> &dyn StateOperation {
        match self {
            Self::RunSQL(op) => op,
            Self::RunRust(op) => op,
            Self::SeparateDatabaseAndState(op) => op,
        }
    }

    /// Returns whether the operation may be dropped when squashing.
    pub const fn elidable(&self) -> bool {
        match self {
            Self::RunSQL(op) => op.elidable,
            Self::RunRust(op) => op.elidable,
            Self::SeparateDatabaseAndState(op) => op.elidable,
        }
    }

    /// Returns every code reference made by this operation, including those
    /// nested in the database operations of a `SeparateDatabaseAndState`.
    pub fn code_paths(&self) -> Vec<&CodePath> {
        match self {
            Self::RunSQL(_) => Vec::new(),
            Self::RunRust(op) => std::iter::once(&op.code)
                .chain(op.reverse_code.as_ref())
                .collect(),
            Self::SeparateDatabaseAndState(op) => op
                .database_operations
                .iter()
                .filter_map(|nested| match nested {
                    Operation::Special(special) => Some(special.code_paths()),
                    Operation::Schema(_) => None,
                })
                .flatten()
                .collect(),
        }
    }
}

/// The capability of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Representable as a before/after state diff.
    Deducible,
    /// Side-effecting; `elidable` marks it safe to drop when squashing.
    Special {
        /// Whether the operation may be dropped when squashing.
        elidable: bool,
    },
}

/// Any migration operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operation {
    Schema(SchemaOperation),
    Special(SpecialOperation),
}

impl Operation {
    /// Returns the capability of this operation.
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Schema(_) => OperationKind::Deducible,
            Self::Special(op) => OperationKind::Special {
                elidable: op.elidable(),
            },
        }
    }

    fn inner(&self) -> &dyn StateOperation {
        match self {
            Self::Schema(op) => op.inner(),
            Self::Special(op) => op.inner(),
        }
    }
}

impl StateOperation for Operation {
    fn describe(&self) -> String {
        self.inner().describe()
    }

    fn state_forwards(&self, app_label: &str, state: &mut ProjectState) {
        self.inner().state_forwards(app_label, state);
    }

    fn migration_name_fragment(&self) -> Option<String> {
        self.inner().migration_name_fragment()
    }
}

macro_rules! impl_from_operation {
    ($($variant:ident => $kind:ident($group:ident)),* $(,)?) => {
        $(
            impl From<$variant> for Operation {
                fn from(op: $variant) -> Self {
                    Self::$kind($group::$variant(op))
                }
            }
        )*
    };
}

impl_from_operation! {
    CreateModel => Schema(SchemaOperation),
    DeleteModel => Schema(SchemaOperation),
    AddField => Schema(SchemaOperation),
    RemoveField => Schema(SchemaOperation),
    AlterField => Schema(SchemaOperation),
    RenameField => Schema(SchemaOperation),
    AddIndex => Schema(SchemaOperation),
    RemoveIndex => Schema(SchemaOperation),
    AlterUniqueTogether => Schema(SchemaOperation),
    RunSQL => Special(SpecialOperation),
    RunRust => Special(SpecialOperation),
    SeparateDatabaseAndState => Special(SpecialOperation),
}

// ============================================================
// Code references
// ============================================================

/// Where a referenced function lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeTarget {
    /// Shared library code that outlives any migration.
    Library,
    /// A historical migration module, e.g. `billing.migrations.0003_backfill`.
    MigrationModule,
}

/// A dotted reference to a function: `module.path.symbol`.
///
/// Serialized as its dotted string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CodePath {
    /// The module segments.
    pub module: Vec<String>,
    /// The function name.
    pub symbol: String,
}

impl CodePath {
    /// Parses a dotted path. At least one module segment is required.
    pub fn parse(path: &str) -> Result<Self, ReplaceError> {
        let mut segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.len() < 2 || segments.iter().any(String::is_empty) {
            return Err(ReplaceError::SerializationError(format!(
                "Invalid code path '{path}': expected 'module.function'"
            )));
        }
        let symbol = segments.pop().unwrap_or_default();
        Ok(Self {
            module: segments,
            symbol,
        })
    }

    /// Returns the dotted module path.
    pub fn module_path(&self) -> String {
        self.module.join(".")
    }

    /// Classifies the module this path points into.
    ///
    /// Migration modules are named after their migration, which always starts
    /// with a sequence number.
    pub fn target(&self) -> CodeTarget {
        match self.module.last() {
            Some(last) if last.starts_with(|c: char| c.is_ascii_digit()) => {
                CodeTarget::MigrationModule
            }
            _ => CodeTarget::Library,
        }
    }
}

impl fmt::Display for CodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module_path(), self.symbol)
    }
}

impl TryFrom<String> for CodePath {
    type Error = ReplaceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CodePath> for String {
    fn from(path: CodePath) -> Self {
        path.to_string()
    }
}
