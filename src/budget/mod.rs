//! Interaction budget: per-subject and global reply quotas with spam
//! suspension, persisted across restarts.

pub mod ledger;
pub mod tracker;

pub use ledger::BudgetLedger;
pub use tracker::{BudgetDecision, Denial, InteractionBudget};
