//! Composing replacement migrations.
//!
//! The composer asks a [`ChangeDetector`] for the migrations that turn a
//! baseline state into the desired state, then rewires them so that each one
//! replaces every existing migration of its app:
//!
//! 1. every graph node is a replace candidate, in topological order;
//! 2. the baseline is the state of the graph with the requested apps hidden;
//! 3. the detector proposes migrations, scoped to the requested apps;
//! 4. each proposal replaces all candidates of its app, together with what
//!    they already replace, and drops dependencies on them;
//! 5. the non-elidable special operations of the replaced migrations are
//!    appended, in replaced-migration order;
//! 6. each proposal gets a [`PortabilityReport`];
//! 7. a proposal equal to the single existing migration of its app is dropped.
//!
//! Special operations always land after the new deducible operations, even
//! when they originally ran before a later structural change.

use std::collections::{BTreeMap, BTreeSet};

use replace_migrations_core::{ReplaceError, ReplaceResult};

use crate::autodetect::{ChangeDetector, MigrationAutodetector, ProjectState};
use crate::classify::carried_operations;
use crate::migration::{GraphView, Migration, MigrationGraph, MigrationKey};
use crate::portability::{analyze, PortabilityReport};
use crate::projector::project_state;
use crate::questioner::MigrationQuestioner;

/// A composed migration and what it needs before old files can go.
#[derive(Debug, Clone, PartialEq)]
pub struct Replacement {
    pub migration: Migration,
    pub portability: PortabilityReport,
}

/// Composed replacements per app label.
pub type ReplacementSet = BTreeMap<String, Vec<Replacement>>;

/// Builds replacement migrations for a loaded graph.
pub struct ReplacementComposer<'a> {
    graph: &'a MigrationGraph,
    app_labels: &'a BTreeSet<String>,
    migration_name: Option<&'a str>,
}

impl<'a> ReplacementComposer<'a> {
    /// Creates a composer for the requested apps. An empty set means all apps.
    pub const fn new(graph: &'a MigrationGraph, app_labels: &'a BTreeSet<String>) -> Self {
        Self {
            graph,
            app_labels,
            migration_name: None,
        }
    }

    /// Overrides the suggested name of every composed migration.
    pub const fn with_name(mut self, migration_name: Option<&'a str>) -> Self {
        self.migration_name = migration_name;
        self
    }

    fn scope(&self) -> Option<&'a BTreeSet<String>> {
        (!self.app_labels.is_empty()).then_some(self.app_labels)
    }

    /// Fails when a requested app (or any app, when none is requested) has
    /// more than one leaf migration.
    pub fn check_conflicts(&self) -> ReplaceResult<()> {
        let mut conflicts = self.graph.detect_conflicts();
        if let Some(apps) = self.scope() {
            conflicts.retain(|app, _| apps.contains(app));
        }
        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(ReplaceError::ConflictingHistory(conflicts))
        }
    }

    /// Returns whether `app_label` is diffed against a baseline without its
    /// own history. Otherwise its replacement only holds the changes since
    /// that history, yet still replaces all of it.
    pub fn rebuilds_from_scratch(&self, app_label: &str) -> bool {
        self.scope().is_some_and(|apps| apps.contains(app_label))
    }

    /// Projects the state of every migration outside the requested apps.
    pub fn baseline_state(&self) -> ReplaceResult<ProjectState> {
        project_state(GraphView::excluding(self.graph, self.app_labels), None, true)
    }

    /// Runs the detector and rewires its proposals into replacements.
    pub fn compose(
        &self,
        detector: &dyn ChangeDetector,
        questioner: &mut dyn MigrationQuestioner,
    ) -> ReplaceResult<ReplacementSet> {
        let candidates = self.graph.topological_order()?;

        let changes = detector.changes(
            self.graph,
            self.scope(),
            self.scope(),
            self.migration_name,
            questioner,
        );

        let mut composed: BTreeMap<String, Vec<Migration>> = BTreeMap::new();
        for (app_label, migrations) in changes {
            let app_candidates: Vec<&MigrationKey> = candidates
                .iter()
                .filter(|(app, _)| *app == app_label)
                .collect();
            if !self.rebuilds_from_scratch(&app_label) {
                tracing::warn!(
                    "Replacement for '{app_label}' is built against its existing history \
                     and only holds the changes since then"
                );
            }

            let rewired = migrations
                .into_iter()
                .map(|mut migration| {
                    let replaces = self.replace_list(&app_candidates, &migration.key());
                    migration.dependencies.retain(|dependency| {
                        !replaces.contains(dependency) && !app_candidates.contains(&dependency)
                    });
                    for key in &app_candidates {
                        if let Some(replaced) = self.graph.node(key) {
                            migration
                                .operations
                                .extend(carried_operations(replaced).cloned());
                        }
                    }
                    migration.replaces = replaces;
                    migration
                })
                .collect();
            composed.insert(app_label, rewired);
        }

        self.drop_already_replaced(&mut composed);

        Ok(composed
            .into_iter()
            .map(|(app_label, migrations)| {
                let replacements = migrations
                    .into_iter()
                    .map(|migration| Replacement {
                        portability: analyze(&migration),
                        migration,
                    })
                    .collect();
                (app_label, replacements)
            })
            .collect())
    }

    /// Returns what a new migration replaces: every candidate, each preceded
    /// by the migrations it already replaces, without the new migration itself.
    fn replace_list(&self, candidates: &[&MigrationKey], new_key: &MigrationKey) -> Vec<MigrationKey> {
        let mut replaces: Vec<MigrationKey> = Vec::new();
        for &candidate in candidates {
            let earlier = self
                .graph
                .node(candidate)
                .map(|m| m.replaces.as_slice())
                .unwrap_or_default();
            for key in earlier.iter().chain(std::iter::once(candidate)) {
                if key != new_key && !replaces.contains(key) {
                    replaces.push(key.clone());
                }
            }
        }
        replaces
    }

    /// Drops proposals that only restate an app's single existing migration.
    ///
    /// Dependencies on a dropped proposal are pointed back at the migration
    /// it would have replaced.
    fn drop_already_replaced(&self, composed: &mut BTreeMap<String, Vec<Migration>>) {
        let mut redirects: BTreeMap<MigrationKey, MigrationKey> = BTreeMap::new();

        loop {
            let mut dropped_any = false;
            for (app_label, migrations) in composed.iter() {
                let [migration] = migrations.as_slice() else {
                    continue;
                };
                if redirects.contains_key(&migration.key()) {
                    continue;
                }
                let existing: Vec<&Migration> = self
                    .graph
                    .nodes()
                    .filter(|m| m.app_label == *app_label)
                    .collect();
                let [existing] = existing.as_slice() else {
                    continue;
                };
                if restates(migration, existing, &redirects) {
                    tracing::debug!("'{app_label}' is already replaced by {}", existing.name);
                    redirects.insert(migration.key(), existing.key());
                    dropped_any = true;
                }
            }
            if !dropped_any {
                break;
            }
        }

        composed.retain(|_, migrations| {
            !migrations
                .iter()
                .any(|migration| redirects.contains_key(&migration.key()))
        });
        for migration in composed.values_mut().flatten() {
            for dependency in &mut migration.dependencies {
                if let Some(existing) = redirects.get(dependency) {
                    dependency.clone_from(existing);
                }
            }
        }
    }
}

fn restates(
    migration: &Migration,
    existing: &Migration,
    redirects: &BTreeMap<MigrationKey, MigrationKey>,
) -> bool {
    let mut dependencies: Vec<MigrationKey> = migration
        .dependencies
        .iter()
        .map(|dependency| redirects.get(dependency).unwrap_or(dependency).clone())
        .collect();
    dependencies.sort();
    let mut existing_dependencies = existing.dependencies.clone();
    existing_dependencies.sort();

    dependencies == existing_dependencies && migration.operations == existing.operations
}

/// Composes replacements with the default [`MigrationAutodetector`].
///
/// `desired_state` is the schema the project declares now.
pub fn replace_all(
    graph: &MigrationGraph,
    app_labels: &BTreeSet<String>,
    desired_state: ProjectState,
    questioner: &mut dyn MigrationQuestioner,
    migration_name: Option<&str>,
) -> ReplaceResult<ReplacementSet> {
    let composer = ReplacementComposer::new(graph, app_labels).with_name(migration_name);
    composer.check_conflicts()?;
    let detector = MigrationAutodetector::new(composer.baseline_state()?, desired_state);
    composer.compose(&detector, questioner)
}

/// The message shown when no replacement was composed.
pub fn no_changes_message(app_labels: &BTreeSet<String>) -> String {
    match app_labels.len() {
        0 => "No changes detected".to_string(),
        1 => format!(
            "No changes detected in app '{}'",
            app_labels.iter().next().map_or("", String::as_str)
        ),
        _ => format!(
            "No changes detected in apps '{}'",
            app_labels
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("', '")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodetect::{ModelOptions, ModelState};
    use crate::fields::{FieldDef, FieldType};
    use crate::operations::{AddField, CodePath, CreateModel, Operation, RunRust, RunSQL};
    use crate::questioner::NonInteractiveQuestioner;

    fn labels(apps: &[&str]) -> BTreeSet<String> {
        apps.iter().map(|s| (*s).to_string()).collect()
    }

    fn key(app: &str, name: &str) -> MigrationKey {
        (app.to_string(), name.to_string())
    }

    fn id() -> FieldDef {
        FieldDef::new("id", FieldType::BigAutoField).primary_key()
    }

    fn status() -> FieldDef {
        FieldDef::new("status", FieldType::CharField).max_length(20)
    }

    fn backfill(elidable: bool) -> RunRust {
        RunRust {
            code: CodePath::parse("shared.backfills.backfill_status").unwrap(),
            reverse_code: None,
            elidable,
        }
    }

    fn billing_history(backfill_op: RunRust) -> MigrationGraph {
        MigrationGraph::from_migrations([
            Migration::new("billing", "0001_initial")
                .initial()
                .add_operation(CreateModel {
                    name: "Invoice".into(),
                    fields: vec![id()],
                    options: ModelOptions::default(),
                }),
            Migration::new("billing", "0002_add_invoice_status")
                .depends_on("billing", "0001_initial")
                .add_operation(AddField {
                    model_name: "Invoice".into(),
                    field: status(),
                }),
            Migration::new("billing", "0003_backfill_status")
                .depends_on("billing", "0002_add_invoice_status")
                .add_operation(backfill_op),
        ])
        .unwrap()
    }

    fn desired() -> ProjectState {
        ProjectState::from(vec![ModelState::new("billing", "Invoice", vec![id(), status()])])
    }

    fn questioner(apps: &BTreeSet<String>) -> NonInteractiveQuestioner {
        NonInteractiveQuestioner::new(apps.clone(), 0)
    }

    // ── Composition ─────────────────────────────────────────────────

    #[test]
    fn test_replaces_all_migrations_of_app() {
        let graph = billing_history(backfill(false));
        let apps = labels(&["billing"]);
        let set = replace_all(&graph, &apps, desired(), &mut questioner(&apps), Some("squashed"))
            .unwrap();

        let replacement = &set["billing"][0];
        let migration = &replacement.migration;
        assert_eq!(migration.name, "0001_squashed");
        assert_eq!(
            migration.replaces,
            vec![
                key("billing", "0001_initial"),
                key("billing", "0002_add_invoice_status"),
                key("billing", "0003_backfill_status"),
            ]
        );
        assert!(migration.dependencies.is_empty());
        assert!(migration.initial);
        assert_eq!(
            migration.operations.last(),
            Some(&Operation::from(backfill(false)))
        );
        assert!(!replacement.portability.needs_manual_porting());
        assert_eq!(replacement.portability.imports, vec!["shared.backfills"]);
    }

    #[test]
    fn test_elidable_operation_is_not_carried() {
        let graph = billing_history(backfill(true));
        let apps = labels(&["billing"]);
        let set = replace_all(&graph, &apps, desired(), &mut questioner(&apps), None).unwrap();
        let migration = &set["billing"][0].migration;
        assert!(migration
            .operations
            .iter()
            .all(|op| matches!(op, Operation::Schema(_))));
    }

    #[test]
    fn test_dependencies_exclude_replaced() {
        let graph = billing_history(backfill(false));
        let apps = labels(&["billing"]);
        let set = replace_all(&graph, &apps, desired(), &mut questioner(&apps), None).unwrap();
        for replacement in set.values().flatten() {
            let m = &replacement.migration;
            assert!(m.dependencies.iter().all(|d| !m.replaces.contains(d)));
        }
    }

    #[test]
    fn test_all_apps_without_changes() {
        let graph = billing_history(backfill(false));
        let apps = BTreeSet::new();
        let set = replace_all(&graph, &apps, desired(), &mut questioner(&apps), None).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_all_apps_with_schema_change() {
        let graph = billing_history(backfill(false));
        let mut state = desired();
        state
            .get_model_mut("billing", "Invoice")
            .unwrap()
            .fields
            .push(FieldDef::new("total", FieldType::IntegerField));
        let apps = BTreeSet::new();
        let set = replace_all(&graph, &apps, state, &mut questioner(&apps), None).unwrap();
        let migration = &set["billing"][0].migration;
        assert_eq!(migration.name, "0001_invoice_total");
        assert_eq!(migration.replaces.len(), 3);
        assert!(migration.dependencies.is_empty());
        assert_eq!(migration.operations.len(), 2);
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let graph = billing_history(backfill(false));
        let apps = labels(&["billing"]);
        let first = replace_all(&graph, &apps, desired(), &mut questioner(&apps), Some("squashed"))
            .unwrap();

        let squashed = first["billing"][0].migration.clone();
        let graph = MigrationGraph::from_migrations([squashed]).unwrap();
        let second = replace_all(&graph, &apps, desired(), &mut questioner(&apps), Some("squashed"))
            .unwrap();
        assert!(second.is_empty());
    }

    fn manual_backfill() -> RunRust {
        RunRust {
            code: CodePath::parse("billing.migrations.0003_backfill_status.forwards").unwrap(),
            reverse_code: None,
            elidable: false,
        }
    }

    /// The old history plus the replacement written next to it.
    fn history_with(replacement: Migration, backfill_op: RunRust) -> MigrationGraph {
        let old = billing_history(backfill_op);
        MigrationGraph::from_migrations(old.nodes().cloned().chain([replacement])).unwrap()
    }

    #[test]
    fn test_second_run_after_manual_porting_is_a_no_op() {
        let graph = billing_history(manual_backfill());
        let apps = labels(&["billing"]);
        let first = replace_all(&graph, &apps, desired(), &mut questioner(&apps), Some("squashed"))
            .unwrap();
        assert!(first["billing"][0].portability.needs_manual_porting());

        let graph = history_with(first["billing"][0].migration.clone(), manual_backfill());
        assert_eq!(graph.len(), 1);
        let second = replace_all(&graph, &apps, desired(), &mut questioner(&apps), Some("squashed"))
            .unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_replace_list_carries_earlier_replacements() {
        let graph = billing_history(manual_backfill());
        let apps = labels(&["billing"]);
        let first = replace_all(&graph, &apps, desired(), &mut questioner(&apps), Some("squashed"))
            .unwrap();
        let graph = history_with(first["billing"][0].migration.clone(), manual_backfill());

        let mut state = desired();
        state
            .get_model_mut("billing", "Invoice")
            .unwrap()
            .fields
            .push(FieldDef::new("total", FieldType::IntegerField));
        let second = replace_all(&graph, &apps, state, &mut questioner(&apps), Some("squashed"))
            .unwrap();
        let migration = &second["billing"][0].migration;
        assert_eq!(migration.name, "0001_squashed");
        assert_eq!(
            migration.replaces,
            vec![
                key("billing", "0001_initial"),
                key("billing", "0002_add_invoice_status"),
                key("billing", "0003_backfill_status"),
            ]
        );
        assert_eq!(
            migration.operations.last(),
            Some(&Operation::from(manual_backfill()))
        );
        assert_eq!(
            migration
                .operations
                .iter()
                .filter(|op| matches!(op, Operation::Special(_)))
                .count(),
            1
        );
    }

    #[test]
    fn test_rebuilds_from_scratch_only_for_requested_apps() {
        let graph = billing_history(backfill(false));
        let billing = labels(&["billing"]);
        let composer = ReplacementComposer::new(&graph, &billing);
        assert!(composer.rebuilds_from_scratch("billing"));
        assert!(!composer.rebuilds_from_scratch("shop"));

        let all = BTreeSet::new();
        assert!(!ReplacementComposer::new(&graph, &all).rebuilds_from_scratch("billing"));
    }

    #[test]
    fn test_composition_is_deterministic() {
        let graph = billing_history(backfill(false));
        let apps = labels(&["billing"]);
        let a = replace_all(&graph, &apps, desired(), &mut questioner(&apps), Some("x")).unwrap();
        let b = replace_all(&graph, &apps, desired(), &mut questioner(&apps), Some("x")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_special_operations_follow_replaced_order() {
        let sql = |statement: &str| RunSQL {
            sql: statement.into(),
            reverse_sql: None,
            elidable: false,
        };
        let graph = MigrationGraph::from_migrations([
            Migration::new("billing", "0001_initial").add_operation(sql("first")),
            Migration::new("billing", "0002_second")
                .depends_on("billing", "0001_initial")
                .add_operation(sql("second")),
        ])
        .unwrap();
        let apps = labels(&["billing"]);
        let state = ProjectState::from(vec![ModelState::new("billing", "Invoice", vec![id()])]);
        let set = replace_all(&graph, &apps, state, &mut questioner(&apps), None).unwrap();
        let ops = &set["billing"][0].migration.operations;
        assert_eq!(ops.len(), 3);
        assert!(matches!(ops[0], Operation::Schema(_)));
        assert_eq!(ops[1], Operation::from(sql("first")));
        assert_eq!(ops[2], Operation::from(sql("second")));
    }

    // ── Conflicts ───────────────────────────────────────────────────

    #[test]
    fn test_conflicts_scoped_to_requested_apps() {
        let graph = MigrationGraph::from_migrations([
            Migration::new("billing", "0001_initial"),
            Migration::new("billing", "0002_a").depends_on("billing", "0001_initial"),
            Migration::new("billing", "0002_b").depends_on("billing", "0001_initial"),
            Migration::new("shop", "0001_initial"),
        ])
        .unwrap();

        let shop = labels(&["shop"]);
        assert!(ReplacementComposer::new(&graph, &shop).check_conflicts().is_ok());

        let all = BTreeSet::new();
        let err = ReplacementComposer::new(&graph, &all)
            .check_conflicts()
            .unwrap_err();
        assert!(err.to_string().contains("0002_a, 0002_b in billing"));
    }

    // ── Messages ────────────────────────────────────────────────────

    #[test]
    fn test_no_changes_message() {
        assert_eq!(no_changes_message(&BTreeSet::new()), "No changes detected");
        assert_eq!(
            no_changes_message(&labels(&["billing"])),
            "No changes detected in app 'billing'"
        );
        assert_eq!(
            no_changes_message(&labels(&["shop", "billing"])),
            "No changes detected in apps 'billing', 'shop'"
        );
    }
}
