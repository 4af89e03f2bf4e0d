//! Sorting operations into what a fresh diff reproduces and what it cannot.

use crate::migration::Migration;
use crate::operations::{Operation, OperationKind};

/// What happens to an operation of a replaced migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Reproduced by the state diff, so dropped.
    Deducible,
    /// Side-effecting and carried into the replacement.
    Special,
    /// Side-effecting but safe to drop.
    Elidable,
}

/// Classifies one operation.
pub const fn classify(operation: &Operation) -> Classification {
    match operation.kind() {
        OperationKind::Deducible => Classification::Deducible,
        OperationKind::Special { elidable: true } => Classification::Elidable,
        OperationKind::Special { elidable: false } => Classification::Special,
    }
}

/// Returns the operations of `migration` that must survive replacement,
/// in their original order.
pub fn carried_operations(migration: &Migration) -> impl Iterator<Item = &Operation> {
    migration
        .operations
        .iter()
        .filter(|op| classify(op) == Classification::Special)
}
