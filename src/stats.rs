//! Session statistics shared between pipeline components.
//!
//! One `Stats` is created per pipeline instance and handed to each component
//! as an `Arc<Stats>`; there is no process-wide counter.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::output::RejectionReason;

/// Counters for one pipeline instance.
#[derive(Debug, Default)]
pub struct Stats {
    inputs_assessed: AtomicU64,
    inputs_guarded: AtomicU64,
    inputs_blocked: AtomicU64,
    budget_allowed: AtomicU64,
    budget_denied: AtomicU64,
    suspensions: AtomicU64,
    outputs_accepted: AtomicU64,
    outputs_truncated: AtomicU64,
    generation_attempts: AtomicU64,
    generator_failures: AtomicU64,
    duplicates: AtomicU64,
    fallbacks: AtomicU64,
    rejections: Mutex<BTreeMap<&'static str, u64>>,
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub inputs_assessed: u64,
    pub inputs_guarded: u64,
    pub inputs_blocked: u64,
    pub budget_allowed: u64,
    pub budget_denied: u64,
    pub suspensions: u64,
    pub outputs_accepted: u64,
    pub outputs_truncated: u64,
    pub outputs_rejected: BTreeMap<String, u64>,
    pub generation_attempts: u64,
    pub generator_failures: u64,
    pub duplicates: u64,
    pub fallbacks: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_input(&self, guarded: bool, blocked: bool) {
        bump(&self.inputs_assessed);
        if blocked {
            bump(&self.inputs_blocked);
        } else if guarded {
            bump(&self.inputs_guarded);
        }
    }

    pub(crate) fn record_budget(&self, allowed: bool) {
        if allowed {
            bump(&self.budget_allowed);
        } else {
            bump(&self.budget_denied);
        }
    }

    pub(crate) fn record_suspension(&self) {
        bump(&self.suspensions);
    }

    pub(crate) fn record_accepted(&self, truncated: bool) {
        bump(&self.outputs_accepted);
        if truncated {
            bump(&self.outputs_truncated);
        }
    }

    pub(crate) fn record_rejected(&self, reason: RejectionReason) {
        let mut rejections = self
            .rejections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *rejections.entry(reason.as_str()).or_insert(0) += 1;
    }

    pub(crate) fn record_attempt(&self) {
        bump(&self.generation_attempts);
    }

    pub(crate) fn record_generator_failure(&self) {
        bump(&self.generator_failures);
    }

    pub(crate) fn record_duplicate(&self) {
        bump(&self.duplicates);
    }

    pub(crate) fn record_fallback(&self) {
        bump(&self.fallbacks);
    }

    /// Copy the current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let rejections = self
            .rejections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        StatsSnapshot {
            inputs_assessed: load(&self.inputs_assessed),
            inputs_guarded: load(&self.inputs_guarded),
            inputs_blocked: load(&self.inputs_blocked),
            budget_allowed: load(&self.budget_allowed),
            budget_denied: load(&self.budget_denied),
            suspensions: load(&self.suspensions),
            outputs_accepted: load(&self.outputs_accepted),
            outputs_truncated: load(&self.outputs_truncated),
            outputs_rejected: rejections
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            generation_attempts: load(&self.generation_attempts),
            generator_failures: load(&self.generator_failures),
            duplicates: load(&self.duplicates),
            fallbacks: load(&self.fallbacks),
        }
    }
}
