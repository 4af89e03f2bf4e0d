//! Detecting replacements that reference code inside old migrations.
//!
//! A carried `RunRust` may call a function that lives in a migration module.
//! Once the old migration file is deleted that function is gone, so the
//! replacement needs its code copied by hand first.

use std::collections::BTreeSet;

use crate::migration::Migration;
use crate::operations::{CodeTarget, Operation};

/// Code references made by the special operations of one migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortabilityReport {
    /// Library module paths, sorted.
    pub imports: Vec<String>,
    /// Historical migration modules whose functions must be copied, sorted.
    pub migration_imports: Vec<String>,
}

impl PortabilityReport {
    /// Returns whether the old migrations must be kept until ported by hand.
    pub fn needs_manual_porting(&self) -> bool {
        !self.migration_imports.is_empty()
    }
}

/// Collects the code references of every special operation in `migration`.
pub fn analyze(migration: &Migration) -> PortabilityReport {
    let mut imports = BTreeSet::new();
    let mut migration_imports = BTreeSet::new();

    for operation in &migration.operations {
        let Operation::Special(special) = operation else {
            continue;
        };
        for path in special.code_paths() {
            match path.target() {
                CodeTarget::Library => imports.insert(path.module_path()),
                CodeTarget::MigrationModule => migration_imports.insert(path.module_path()),
            };
        }
    }

    if !migration_imports.is_empty() {
        tracing::debug!(
            "{}.{} references migration modules: {:?}",
            migration.app_label,
            migration.name,
            migration_imports
        );
    }

    PortabilityReport {
        imports: imports.into_iter().collect(),
        migration_imports: migration_imports.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{CodePath, RunRust, RunSQL, SeparateDatabaseAndState};

    fn run_rust(code: &str, reverse: Option<&str>) -> RunRust {
        RunRust {
            code: CodePath::parse(code).unwrap(),
            reverse_code: reverse.map(|r| CodePath::parse(r).unwrap()),
            elidable: false,
        }
    }

    #[test]
    fn test_library_code_is_portable() {
        let m = Migration::new("billing", "0001_squashed")
            .add_operation(run_rust("shared.backfills.backfill_status", Some("shared.noop.noop")));
        let report = analyze(&m);
        assert_eq!(report.imports, vec!["shared.backfills", "shared.noop"]);
        assert!(report.migration_imports.is_empty());
        assert!(!report.needs_manual_porting());
    }

    #[test]
    fn test_migration_module_needs_porting() {
        let m = Migration::new("billing", "0001_squashed").add_operation(run_rust(
            "billing.migrations.0003_backfill_status.forwards",
            None,
        ));
        let report = analyze(&m);
        assert_eq!(
            report.migration_imports,
            vec!["billing.migrations.0003_backfill_status"]
        );
        assert!(report.needs_manual_porting());
    }

    #[test]
    fn test_nested_database_operations_are_inspected() {
        let m = Migration::new("billing", "0001_squashed").add_operation(SeparateDatabaseAndState {
            state_operations: Vec::new(),
            database_operations: vec![
                run_rust("billing.migrations.0002_move.forwards", None).into(),
                RunSQL {
                    sql: "SELECT 1".into(),
                    reverse_sql: None,
                    elidable: false,
                }
                .into(),
            ],
            elidable: false,
        });
        assert!(analyze(&m).needs_manual_porting());
    }

    #[test]
    fn test_no_special_operations() {
        let report = analyze(&Migration::new("billing", "0001_initial"));
        assert_eq!(report, PortabilityReport::default());
    }
}
