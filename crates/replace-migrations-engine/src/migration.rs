//! Migration structs and dependency graph.
//!
//! A [`Migration`] is a named unit of schema change containing a sequence of
//! [`Operation`]s. The [`MigrationGraph`] manages the dependency DAG between
//! migrations across all apps, and a [`GraphView`] hides the nodes of some
//! apps without touching the graph itself.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use replace_migrations_core::{ReplaceError, ReplaceResult};

use crate::operations::{Operation, StateOperation};
use crate::recorder::MigrationRecorder;

/// A migration key: `(app_label, migration_name)`.
pub type MigrationKey = (String, String);

/// The app label used by dependencies on a swappable model setting.
pub const SETTING_SENTINEL: &str = "__setting__";

/// Suggested names longer than this are cut short with `_and_more`.
const MAX_SUGGESTED_NAME: usize = 52;

/// Returns whether `name` can be used as a migration name override.
pub fn is_valid_migration_name(name: &str) -> bool {
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    let identifier = IDENTIFIER.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
    identifier.is_match(name)
}

/// A single migration containing a sequence of operations.
///
/// Migrations are identified by `(app_label, name)` and may declare
/// dependencies on other migrations. Operations within a migration
/// are applied in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Migration {
    /// The migration name (e.g., "0001_initial").
    pub name: String,
    /// The application label this migration belongs to.
    pub app_label: String,
    /// Dependencies on other migrations: `(app_label, migration_name)`.
    pub dependencies: Vec<MigrationKey>,
    /// The operations to apply, in order.
    pub operations: Vec<Operation>,
    /// The migrations this one supersedes.
    pub replaces: Vec<MigrationKey>,
    /// Whether this is the initial migration for the app.
    pub initial: bool,
}

impl Migration {
    /// Creates a new migration.
    pub fn new(app_label: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            app_label: app_label.into(),
            dependencies: Vec::new(),
            operations: Vec::new(),
            replaces: Vec::new(),
            initial: false,
        }
    }

    /// Marks this migration as the initial migration.
    pub fn initial(mut self) -> Self {
        self.initial = true;
        self
    }

    /// Adds a dependency on another migration.
    pub fn depends_on(mut self, app_label: impl Into<String>, name: impl Into<String>) -> Self {
        self.dependencies.push((app_label.into(), name.into()));
        self
    }

    /// Adds an operation to this migration.
    pub fn add_operation(mut self, op: impl Into<Operation>) -> Self {
        self.operations.push(op.into());
        self
    }

    /// Declares that this migration replaces another one.
    pub fn replacing(mut self, app_label: impl Into<String>, name: impl Into<String>) -> Self {
        self.replaces.push((app_label.into(), name.into()));
        self
    }

    /// Returns the `(app_label, name)` key for this migration.
    pub fn key(&self) -> MigrationKey {
        (self.app_label.clone(), self.name.clone())
    }

    /// Suggests a descriptive name from the operations.
    ///
    /// Initial migrations are called `initial`. When any operation has no name
    /// fragment, a timestamped `auto_YYYYMMDD_HHMM` name is used instead.
    pub fn suggest_name(&self) -> String {
        if self.initial {
            return "initial".to_string();
        }

        let fragments: Vec<String> = self
            .operations
            .iter()
            .filter_map(StateOperation::migration_name_fragment)
            .collect();
        if fragments.is_empty() || fragments.len() != self.operations.len() {
            return format!("auto_{}", chrono::Utc::now().format("%Y%m%d_%H%M"));
        }

        let mut name = fragments[0].clone();
        for fragment in &fragments[1..] {
            let candidate = format!("{name}_{fragment}");
            if candidate.len() > MAX_SUGGESTED_NAME {
                name.push_str("_and_more");
                break;
            }
            name = candidate;
        }
        name
    }
}

/// A directed acyclic graph (DAG) of migrations.
///
/// The graph owns every loaded migration and tracks their dependency
/// relationships. Dependencies on the [`SETTING_SENTINEL`] pseudo-app and on
/// apps without tracked migrations are not edges.
#[derive(Debug, Clone, Default)]
pub struct MigrationGraph {
    /// All migrations keyed by `(app_label, name)`.
    nodes: BTreeMap<MigrationKey, Migration>,
    /// Forward edges: from dependency to dependent.
    forward_edges: BTreeMap<MigrationKey, BTreeSet<MigrationKey>>,
    /// Backward edges: from dependent to dependency.
    backward_edges: BTreeMap<MigrationKey, BTreeSet<MigrationKey>>,
}

impl MigrationGraph {
    /// Creates a new empty migration graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a validated graph from a set of migrations.
    ///
    /// A migration with `replaces` stands in for the migrations it replaces:
    /// replaced migrations still present are dropped from the graph, and every
    /// dependency on a replaced key points at the replacing migration.
    ///
    /// Fails with [`ReplaceError::LoadError`] when a dependency names a
    /// missing migration of a tracked app, or when the graph has a cycle.
    pub fn from_migrations(migrations: impl IntoIterator<Item = Migration>) -> ReplaceResult<Self> {
        let mut graph = Self::new();
        for migration in migrations {
            graph.add_node(migration);
        }

        let replaced_by = graph.replacement_map();
        let mut inherited: BTreeMap<MigrationKey, Vec<MigrationKey>> = BTreeMap::new();
        for (replaced, replacement) in &replaced_by {
            if let Some(migration) = graph.remove_node(replaced) {
                tracing::debug!(
                    "{}.{} is replaced by {}.{}",
                    replaced.0,
                    replaced.1,
                    replacement.0,
                    replacement.1
                );
                inherited
                    .entry(resolve_replaced(&replaced_by, replacement))
                    .or_default()
                    .extend(migration.dependencies);
            }
        }

        let tracked: BTreeSet<String> = graph.app_labels().into_iter().collect();
        let mut edges: Vec<(MigrationKey, MigrationKey)> = Vec::new();
        for migration in graph.nodes.values() {
            let child = migration.key();
            let parents = migration
                .dependencies
                .iter()
                .chain(inherited.get(&child).into_iter().flatten());
            for parent in parents {
                let parent = resolve_replaced(&replaced_by, parent);
                if parent != child && !edges.contains(&(child.clone(), parent.clone())) {
                    edges.push((child.clone(), parent));
                }
            }
        }

        for (child, parent) in edges {
            if parent.0 == SETTING_SENTINEL {
                continue;
            }
            if !tracked.contains(&parent.0) {
                tracing::debug!(
                    "Ignoring dependency of {}.{} on untracked app '{}'",
                    child.0,
                    child.1,
                    parent.0
                );
                continue;
            }
            graph.add_dependency(child, parent)?;
        }

        graph.validate()?;
        Ok(graph)
    }

    /// Maps every key named in a `replaces` list to the migration replacing it.
    fn replacement_map(&self) -> BTreeMap<MigrationKey, MigrationKey> {
        let mut replaced_by = BTreeMap::new();
        for migration in self.nodes.values() {
            for replaced in &migration.replaces {
                if *replaced != migration.key() {
                    replaced_by.insert(replaced.clone(), migration.key());
                }
            }
        }
        replaced_by
    }

    fn remove_node(&mut self, key: &MigrationKey) -> Option<Migration> {
        let migration = self.nodes.remove(key)?;
        self.forward_edges.remove(key);
        self.backward_edges.remove(key);
        Some(migration)
    }

    /// Adds a migration to the graph, replacing any migration with the same key.
    pub fn add_node(&mut self, migration: Migration) {
        let key = migration.key();
        self.forward_edges.entry(key.clone()).or_default();
        self.backward_edges.entry(key.clone()).or_default();
        self.nodes.insert(key, migration);
    }

    /// Adds a dependency edge: `child` depends on `parent`.
    ///
    /// Both nodes must have been added previously.
    pub fn add_dependency(&mut self, child: MigrationKey, parent: MigrationKey) -> ReplaceResult<()> {
        if !self.nodes.contains_key(&child) {
            return Err(ReplaceError::LoadError(format!(
                "Migration {}.{} not found in graph",
                child.0, child.1
            )));
        }
        if !self.nodes.contains_key(&parent) {
            return Err(ReplaceError::LoadError(format!(
                "Migration {}.{} dependencies reference nonexistent parent node ('{}', '{}')",
                child.0, child.1, parent.0, parent.1
            )));
        }
        self.forward_edges
            .entry(parent.clone())
            .or_default()
            .insert(child.clone());
        self.backward_edges.entry(child).or_default().insert(parent);
        Ok(())
    }

    /// Returns all migrations in topological order (dependencies first).
    ///
    /// Among migrations whose dependencies are all placed, the smallest key
    /// goes first. Returns an error if the graph contains a cycle.
    pub fn topological_order(&self) -> ReplaceResult<Vec<MigrationKey>> {
        let mut in_degree: BTreeMap<&MigrationKey, usize> = self
            .nodes
            .keys()
            .map(|key| (key, self.backward_edges.get(key).map_or(0, BTreeSet::len)))
            .collect();

        let mut ready: BTreeSet<&MigrationKey> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&key, _)| key)
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());
        while let Some(node) = ready.pop_first() {
            result.push(node.clone());
            if let Some(children) = self.forward_edges.get(node) {
                for child in children {
                    if let Some(deg) = in_degree.get_mut(child) {
                        *deg -= 1;
                        if *deg == 0 {
                            ready.insert(child);
                        }
                    }
                }
            }
        }

        if result.len() != self.nodes.len() {
            return Err(ReplaceError::LoadError(
                "Circular dependency detected in migration graph".to_string(),
            ));
        }

        Ok(result)
    }

    /// Returns every node needed to apply `target`, dependencies first,
    /// ending with `target` itself.
    ///
    /// Parents are visited in sorted order so the plan is stable.
    pub fn forwards_plan(&self, target: &MigrationKey) -> ReplaceResult<Vec<MigrationKey>> {
        if !self.nodes.contains_key(target) {
            return Err(ReplaceError::LoadError(format!(
                "Node ('{}', '{}') not a valid node",
                target.0, target.1
            )));
        }

        let mut visited: BTreeSet<MigrationKey> = BTreeSet::new();
        let mut plan = Vec::new();
        let mut stack: Vec<(MigrationKey, bool)> = vec![(target.clone(), false)];

        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                if visited.insert(node.clone()) {
                    plan.push(node);
                }
                continue;
            }
            if visited.contains(&node) {
                continue;
            }
            let parents = self.backward_edges.get(&node).cloned().unwrap_or_default();
            stack.push((node, true));
            for parent in parents.into_iter().rev() {
                if !visited.contains(&parent) {
                    stack.push((parent, false));
                }
            }
        }

        Ok(plan)
    }

    /// Returns the nodes with no dependents anywhere in the graph.
    pub fn leaf_nodes(&self) -> Vec<MigrationKey> {
        self.forward_edges
            .iter()
            .filter(|(_, children)| children.is_empty())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Returns the nodes of `app_label` with no dependents in the same app.
    pub fn app_leaf_nodes(&self, app_label: &str) -> Vec<MigrationKey> {
        self.forward_edges
            .iter()
            .filter(|(key, children)| {
                key.0 == app_label && children.iter().all(|child| child.0 != app_label)
            })
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Returns the nodes of `app_label` with no dependencies in the same app.
    pub fn root_nodes(&self, app_label: &str) -> Vec<MigrationKey> {
        self.backward_edges
            .iter()
            .filter(|(key, parents)| {
                key.0 == app_label && parents.iter().all(|parent| parent.0 != app_label)
            })
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Returns apps with more than one leaf, mapped to their sorted leaf names.
    pub fn detect_conflicts(&self) -> BTreeMap<String, Vec<String>> {
        let mut leaves: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, children) in &self.forward_edges {
            if children.iter().all(|child| child.0 != key.0) {
                leaves.entry(key.0.clone()).or_default().push(key.1.clone());
            }
        }
        leaves.retain(|_, names| names.len() > 1);
        leaves
    }

    /// Checks that no applied migration has an unapplied dependency.
    ///
    /// An unapplied squashed migration whose replaced migrations are all
    /// applied counts as applied.
    pub fn check_consistent_history(&self, recorder: &MigrationRecorder) -> ReplaceResult<()> {
        for key in recorder.applied() {
            if !self.nodes.contains_key(key) {
                continue;
            }
            for parent in self.dependencies(key) {
                if recorder.is_applied(&parent) {
                    continue;
                }
                let squashed_and_applied = self.node(&parent).is_some_and(|m| {
                    !m.replaces.is_empty() && m.replaces.iter().all(|r| recorder.is_applied(r))
                });
                if squashed_and_applied {
                    continue;
                }
                return Err(ReplaceError::InconsistentHistory(format!(
                    "Migration {}.{} is applied before its dependency {}.{} on database '{}'.",
                    key.0,
                    key.1,
                    parent.0,
                    parent.1,
                    recorder.alias()
                )));
            }
        }
        Ok(())
    }

    /// Returns the migration stored under `key`.
    pub fn node(&self, key: &MigrationKey) -> Option<&Migration> {
        self.nodes.get(key)
    }

    /// Returns all migrations, ordered by key.
    pub fn nodes(&self) -> impl Iterator<Item = &Migration> {
        self.nodes.values()
    }

    /// Returns every app label with at least one migration, sorted.
    pub fn app_labels(&self) -> Vec<String> {
        let labels: BTreeSet<&String> = self.nodes.keys().map(|(app, _)| app).collect();
        labels.into_iter().cloned().collect()
    }

    /// Returns the number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns whether the graph contains a given node.
    pub fn contains(&self, key: &MigrationKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// Returns the dependencies of a node.
    pub fn dependencies(&self, key: &MigrationKey) -> Vec<MigrationKey> {
        self.backward_edges
            .get(key)
            .map(|parents| parents.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the dependents of a node.
    pub fn dependents(&self, key: &MigrationKey) -> Vec<MigrationKey> {
        self.forward_edges
            .get(key)
            .map(|children| children.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Validates that the graph has no cycles.
    pub fn validate(&self) -> ReplaceResult<()> {
        self.topological_order()?;
        Ok(())
    }
}

/// Follows replacements from `key` to the migration that currently stands for it.
fn resolve_replaced(
    replaced_by: &BTreeMap<MigrationKey, MigrationKey>,
    key: &MigrationKey,
) -> MigrationKey {
    let mut current = key;
    for _ in 0..=replaced_by.len() {
        match replaced_by.get(current) {
            Some(next) => current = next,
            None => break,
        }
    }
    current.clone()
}

/// A read-only view of a [`MigrationGraph`] that hides the nodes of some apps.
///
/// Edges still come from the full graph, so a plan computed through the view
/// may name hidden nodes; callers skip them with [`GraphView::contains`].
#[derive(Debug, Clone, Copy)]
pub struct GraphView<'a> {
    graph: &'a MigrationGraph,
    excluded: Option<&'a BTreeSet<String>>,
}

impl<'a> GraphView<'a> {
    /// A view that shows the whole graph.
    pub const fn full(graph: &'a MigrationGraph) -> Self {
        Self {
            graph,
            excluded: None,
        }
    }

    /// A view that hides every node of the given apps.
    pub const fn excluding(graph: &'a MigrationGraph, apps: &'a BTreeSet<String>) -> Self {
        Self {
            graph,
            excluded: Some(apps),
        }
    }

    /// Returns the underlying graph.
    pub const fn graph(&self) -> &'a MigrationGraph {
        self.graph
    }

    /// Returns whether the node exists and is not hidden.
    pub fn contains(&self, key: &MigrationKey) -> bool {
        self.graph.contains(key) && !self.is_excluded(&key.0)
    }

    fn is_excluded(&self, app_label: &str) -> bool {
        self.excluded.is_some_and(|apps| apps.contains(app_label))
    }

    /// Returns the migration stored under `key` if it is visible.
    pub fn node(&self, key: &MigrationKey) -> Option<&'a Migration> {
        if self.is_excluded(&key.0) {
            return None;
        }
        self.graph.node(key)
    }

    /// Returns all visible migrations, ordered by key.
    pub fn nodes(&self) -> impl Iterator<Item = &'a Migration> + '_ {
        self.graph
            .nodes()
            .filter(move |m| !self.is_excluded(&m.app_label))
    }

    /// Returns whether no node is visible.
    pub fn is_empty(&self) -> bool {
        self.nodes().next().is_none()
    }

    /// Returns the visible nodes with no visible dependents.
    pub fn leaf_nodes(&self) -> Vec<MigrationKey> {
        self.nodes()
            .map(Migration::key)
            .filter(|key| {
                self.graph
                    .dependents(key)
                    .iter()
                    .all(|child| !self.contains(child))
            })
            .collect()
    }

    /// Returns the forwards plan of a visible node.
    pub fn forwards_plan(&self, target: &MigrationKey) -> ReplaceResult<Vec<MigrationKey>> {
        if !self.contains(target) {
            return Err(ReplaceError::LoadError(format!(
                "Node ('{}', '{}') not a valid node",
                target.0, target.1
            )));
        }
        self.graph.forwards_plan(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{CreateModel, DeleteModel, RunSQL};

    fn key(app: &str, name: &str) -> MigrationKey {
        (app.to_string(), name.to_string())
    }

    fn chain_graph() -> MigrationGraph {
        MigrationGraph::from_migrations([
            Migration::new("billing", "0001_initial").initial(),
            Migration::new("billing", "0002_add_status").depends_on("billing", "0001_initial"),
            Migration::new("billing", "0003_backfill").depends_on("billing", "0002_add_status"),
            Migration::new("shop", "0001_initial")
                .initial()
                .depends_on("billing", "0002_add_status"),
        ])
        .unwrap()
    }

    // ── Migration tests ─────────────────────────────────────────────

    #[test]
    fn test_migration_new() {
        let m = Migration::new("billing", "0001_initial");
        assert_eq!(m.app_label, "billing");
        assert_eq!(m.name, "0001_initial");
        assert!(!m.initial);
        assert!(m.dependencies.is_empty());
        assert!(m.operations.is_empty());
        assert!(m.replaces.is_empty());
    }

    #[test]
    fn test_migration_builders() {
        let m = Migration::new("billing", "0002_add_author")
            .depends_on("billing", "0001_initial")
            .depends_on("auth", "0001_initial")
            .replacing("billing", "0001_old")
            .add_operation(DeleteModel { name: "x".into() });
        assert_eq!(m.dependencies.len(), 2);
        assert_eq!(m.replaces, vec![key("billing", "0001_old")]);
        assert_eq!(m.operations.len(), 1);
        assert_eq!(m.key(), key("billing", "0002_add_author"));
    }

    #[test]
    fn test_suggest_name_initial() {
        let m = Migration::new("billing", "x").initial();
        assert_eq!(m.suggest_name(), "initial");
    }

    #[test]
    fn test_suggest_name_from_fragments() {
        let m = Migration::new("billing", "x")
            .add_operation(CreateModel {
                name: "Invoice".into(),
                fields: Vec::new(),
                options: crate::autodetect::ModelOptions::default(),
            })
            .add_operation(DeleteModel {
                name: "Receipt".into(),
            });
        assert_eq!(m.suggest_name(), "invoice_delete_receipt");
    }

    #[test]
    fn test_suggest_name_and_more() {
        let mut m = Migration::new("billing", "x");
        for i in 0..10 {
            m = m.add_operation(DeleteModel {
                name: format!("very_long_model_name_{i}"),
            });
        }
        assert!(m.suggest_name().ends_with("_and_more"));
    }

    #[test]
    fn test_suggest_name_auto_for_special_operations() {
        let m = Migration::new("billing", "x").add_operation(RunSQL {
            sql: "SELECT 1".into(),
            reverse_sql: None,
            elidable: false,
        });
        assert!(m.suggest_name().starts_with("auto_"));
    }

    #[test]
    fn test_valid_migration_names() {
        assert!(is_valid_migration_name("squashed"));
        assert!(is_valid_migration_name("_squash_2024"));
        assert!(!is_valid_migration_name("1squashed"));
        assert!(!is_valid_migration_name("squash-all"));
        assert!(!is_valid_migration_name(""));
    }

    // ── MigrationGraph tests ────────────────────────────────────────

    #[test]
    fn test_graph_new() {
        let g = MigrationGraph::new();
        assert!(g.is_empty());
        assert_eq!(g.len(), 0);
    }

    #[test]
    fn test_graph_edges() {
        let g = chain_graph();
        assert_eq!(g.len(), 4);
        assert_eq!(
            g.dependents(&key("billing", "0002_add_status")),
            vec![key("billing", "0003_backfill"), key("shop", "0001_initial")]
        );
        assert_eq!(
            g.dependencies(&key("shop", "0001_initial")),
            vec![key("billing", "0002_add_status")]
        );
    }

    #[test]
    fn test_graph_missing_dependency_is_load_error() {
        let result = MigrationGraph::from_migrations([
            Migration::new("billing", "0001_initial"),
            Migration::new("billing", "0002_x").depends_on("billing", "0009_missing"),
        ]);
        assert!(matches!(result, Err(ReplaceError::LoadError(_))));
    }

    #[test]
    fn test_graph_ignores_setting_and_untracked_dependencies() {
        let g = MigrationGraph::from_migrations([Migration::new("billing", "0001_initial")
            .depends_on(SETTING_SENTINEL, "AUTH_USER_MODEL")
            .depends_on("contenttypes", "0002_remove_content_type_name")])
        .unwrap();
        assert!(g.dependencies(&key("billing", "0001_initial")).is_empty());
    }

    #[test]
    fn test_graph_cycle_is_load_error() {
        let result = MigrationGraph::from_migrations([
            Migration::new("a", "0001").depends_on("a", "0002"),
            Migration::new("a", "0002").depends_on("a", "0001"),
        ]);
        match result {
            Err(ReplaceError::LoadError(msg)) => assert!(msg.contains("Circular")),
            other => panic!("expected load error, got {other:?}"),
        }
    }

    #[test]
    fn test_topological_order() {
        let order = chain_graph().topological_order().unwrap();
        assert_eq!(
            order,
            vec![
                key("billing", "0001_initial"),
                key("billing", "0002_add_status"),
                key("billing", "0003_backfill"),
                key("shop", "0001_initial"),
            ]
        );
    }

    #[test]
    fn test_forwards_plan_diamond() {
        let g = MigrationGraph::from_migrations([
            Migration::new("a", "0001"),
            Migration::new("b", "0001").depends_on("a", "0001"),
            Migration::new("c", "0001").depends_on("a", "0001"),
            Migration::new("d", "0001")
                .depends_on("c", "0001")
                .depends_on("b", "0001"),
        ])
        .unwrap();
        let plan = g.forwards_plan(&key("d", "0001")).unwrap();
        assert_eq!(
            plan,
            vec![key("a", "0001"), key("b", "0001"), key("c", "0001"), key("d", "0001")]
        );
    }

    #[test]
    fn test_forwards_plan_unknown_node() {
        assert!(chain_graph().forwards_plan(&key("billing", "0009")).is_err());
    }

    #[test]
    fn test_leaf_and_root_nodes() {
        let g = chain_graph();
        assert_eq!(
            g.leaf_nodes(),
            vec![key("billing", "0003_backfill"), key("shop", "0001_initial")]
        );
        assert_eq!(g.app_leaf_nodes("billing"), vec![key("billing", "0003_backfill")]);
        assert_eq!(g.root_nodes("billing"), vec![key("billing", "0001_initial")]);
        assert_eq!(g.root_nodes("shop"), vec![key("shop", "0001_initial")]);
    }

    #[test]
    fn test_detect_conflicts() {
        let g = MigrationGraph::from_migrations([
            Migration::new("billing", "0001_initial"),
            Migration::new("billing", "0002_b").depends_on("billing", "0001_initial"),
            Migration::new("billing", "0002_a").depends_on("billing", "0001_initial"),
            Migration::new("shop", "0001_initial"),
        ])
        .unwrap();
        let conflicts = g.detect_conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts["billing"], vec!["0002_a", "0002_b"]);
        assert!(chain_graph().detect_conflicts().is_empty());
    }

    #[test]
    fn test_check_consistent_history() {
        let g = chain_graph();
        let mut recorder = MigrationRecorder::new("default");
        recorder.apply(key("billing", "0001_initial"));
        recorder.apply(key("billing", "0002_add_status"));
        assert!(g.check_consistent_history(&recorder).is_ok());

        recorder.unapply(&key("billing", "0001_initial"));
        let err = g.check_consistent_history(&recorder).unwrap_err();
        assert!(err.is_advisory());
        assert!(err
            .to_string()
            .contains("billing.0002_add_status is applied before its dependency billing.0001_initial on database 'default'"));
    }

    #[test]
    fn test_check_consistent_history_squashed_parent() {
        let g = MigrationGraph::from_migrations([
            Migration::new("billing", "0001_squashed").replacing("billing", "0001_initial"),
            Migration::new("billing", "0002_x").depends_on("billing", "0001_squashed"),
        ])
        .unwrap();
        let mut recorder = MigrationRecorder::new("default");
        recorder.apply(key("billing", "0001_initial"));
        recorder.apply(key("billing", "0002_x"));
        assert!(g.check_consistent_history(&recorder).is_ok());
    }

    // ── Replacements ────────────────────────────────────────────────

    #[test]
    fn test_graph_redirects_dependencies_on_replaced_migrations() {
        let g = MigrationGraph::from_migrations([
            Migration::new("billing", "0001_squashed")
                .replacing("billing", "0001_initial")
                .replacing("billing", "0002_add_status"),
            Migration::new("shop", "0001_initial").depends_on("billing", "0002_add_status"),
        ])
        .unwrap();
        assert_eq!(
            g.dependencies(&key("shop", "0001_initial")),
            vec![key("billing", "0001_squashed")]
        );
        let shop = g.node(&key("shop", "0001_initial")).unwrap();
        assert_eq!(shop.dependencies, vec![key("billing", "0002_add_status")]);
    }

    #[test]
    fn test_graph_drops_replaced_migrations_still_present() {
        let mut migrations: Vec<Migration> = chain_graph().nodes().cloned().collect();
        migrations.push(
            Migration::new("billing", "0001_squashed")
                .replacing("billing", "0001_initial")
                .replacing("billing", "0002_add_status"),
        );
        migrations.push(Migration::new("shop", "0001_initial").depends_on("billing", "0001_initial"));
        let g = MigrationGraph::from_migrations(migrations).unwrap();

        assert!(!g.contains(&key("billing", "0001_initial")));
        assert!(!g.contains(&key("billing", "0002_add_status")));
        assert!(g.detect_conflicts().is_empty());
        assert_eq!(g.len(), 3);
        assert_eq!(
            g.app_leaf_nodes("billing"),
            vec![key("billing", "0003_backfill")]
        );
        assert_eq!(
            g.dependents(&key("billing", "0001_squashed")),
            vec![key("billing", "0003_backfill"), key("shop", "0001_initial")]
        );
    }

    #[test]
    fn test_graph_follows_chained_replacements() {
        let g = MigrationGraph::from_migrations([
            Migration::new("billing", "0001_squashed").replacing("billing", "0001_initial"),
            Migration::new("billing", "0002_squashed_again").replacing("billing", "0001_squashed"),
            Migration::new("shop", "0001_initial").depends_on("billing", "0001_initial"),
        ])
        .unwrap();
        assert_eq!(g.len(), 2);
        assert_eq!(
            g.dependencies(&key("shop", "0001_initial")),
            vec![key("billing", "0002_squashed_again")]
        );
    }

    // ── GraphView tests ─────────────────────────────────────────────

    #[test]
    fn test_view_excluding_hides_nodes() {
        let g = chain_graph();
        let excluded: BTreeSet<String> = ["billing".to_string()].into();
        let view = GraphView::excluding(&g, &excluded);
        assert!(!view.contains(&key("billing", "0001_initial")));
        assert!(view.contains(&key("shop", "0001_initial")));
        assert_eq!(view.nodes().count(), 1);
        assert_eq!(view.leaf_nodes(), vec![key("shop", "0001_initial")]);
        assert_eq!(g.len(), 4);
    }

    #[test]
    fn test_view_leaf_nodes_ignore_hidden_dependents() {
        let g = chain_graph();
        let excluded: BTreeSet<String> = ["shop".to_string()].into();
        let view = GraphView::excluding(&g, &excluded);
        assert_eq!(view.leaf_nodes(), vec![key("billing", "0003_backfill")]);

        let excluded: BTreeSet<String> = ["billing".to_string(), "shop".to_string()].into();
        assert!(GraphView::excluding(&g, &excluded).is_empty());
    }

    #[test]
    fn test_view_full_matches_graph() {
        let g = chain_graph();
        let view = GraphView::full(&g);
        assert_eq!(view.leaf_nodes(), g.leaf_nodes());
        assert!(view.forwards_plan(&key("shop", "0001_initial")).is_ok());
    }
}
