//! Replays migration plans into a [`ProjectState`].

use std::collections::BTreeSet;

use replace_migrations_core::ReplaceResult;

use crate::autodetect::ProjectState;
use crate::migration::{GraphView, MigrationKey};
use crate::operations::StateOperation;

/// Returns the nodes needed to reach `targets`, dependencies first.
///
/// Each node appears once. With `at_end == false` the targets themselves are
/// left out, so the plan stops right before them.
pub fn generate_plan(
    view: GraphView<'_>,
    targets: &[MigrationKey],
    at_end: bool,
) -> ReplaceResult<Vec<MigrationKey>> {
    let excluded_targets: BTreeSet<&MigrationKey> = if at_end {
        BTreeSet::new()
    } else {
        targets.iter().collect()
    };
    let mut seen: BTreeSet<MigrationKey> = BTreeSet::new();
    let mut plan: Vec<MigrationKey> = Vec::new();
    for target in targets {
        for node in view.forwards_plan(target)? {
            if excluded_targets.contains(&node) || !seen.insert(node.clone()) {
                continue;
            }
            plan.push(node);
        }
    }
    Ok(plan)
}

/// Projects the state reached by applying every node up to `targets`.
///
/// Without targets, every leaf of the view is a target. Plan entries hidden
/// by the view are skipped.
pub fn project_state(
    view: GraphView<'_>,
    targets: Option<&[MigrationKey]>,
    at_end: bool,
) -> ReplaceResult<ProjectState> {
    if view.is_empty() {
        return Ok(ProjectState::new());
    }

    let leaves;
    let targets = match targets {
        Some(targets) => targets,
        None => {
            leaves = view.leaf_nodes();
            &leaves
        }
    };

    let mut state = ProjectState::new();
    for key in generate_plan(view, targets, at_end)? {
        let Some(migration) = view.node(&key) else {
            tracing::trace!("Skipping hidden node {}.{}", key.0, key.1);
            continue;
        };
        for operation in &migration.operations {
            operation.state_forwards(&migration.app_label, &mut state);
        }
    }
    Ok(state)
}
