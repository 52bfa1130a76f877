//! Interaction budget: decides whether a reply to a subject is allowed now.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::budget::ledger::BudgetLedger;
use crate::config::BudgetLimits;
use crate::error::ConfigError;
use crate::stats::Stats;
use crate::store::StateStore;

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Denial {
    /// Subject is serving a spam suspension.
    Suspended { remaining_minutes: i64 },
    /// This request completed a burst; the subject is now suspended.
    SpamDetected { requests: usize, suspended_minutes: i64 },
    SubjectHourly { count: usize, limit: usize },
    SubjectDaily { count: usize, limit: usize },
    GlobalHourly { count: usize, limit: usize },
    GlobalDaily { count: usize, limit: usize },
}

impl Denial {
    /// Suspension-related refusals (active or just imposed).
    pub fn is_suspension(&self) -> bool {
        matches!(self, Denial::Suspended { .. } | Denial::SpamDetected { .. })
    }
}

/// Result of [`InteractionBudget::check_and_reserve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetDecision {
    pub allowed: bool,
    pub reason: String,
    pub denial: Option<Denial>,
}

impl fmt::Display for BudgetDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

struct Windows {
    hour: TimeDelta,
    retention: TimeDelta,
    spam: TimeDelta,
    suspension: TimeDelta,
}

impl Windows {
    fn from_limits(limits: &BudgetLimits) -> Result<Self, ConfigError> {
        let convert = |key: &str, d: std::time::Duration| {
            TimeDelta::from_std(d).map_err(|_| ConfigError::invalid(key, "out of range"))
        };
        Ok(Self {
            hour: TimeDelta::hours(1),
            retention: convert("budget.retention", limits.retention)?,
            spam: convert("budget.spam_window", limits.spam_window)?,
            suspension: convert("budget.suspension", limits.suspension)?,
        })
    }
}

struct LedgerState {
    ledger: BudgetLedger,
    /// The last save failed; memory is newer than the store.
    unsaved: bool,
}

/// Per-subject, multi-window quota tracker with spam suspension.
///
/// Load, check, append, and save run under one lock, so two concurrent
/// requests for the same subject can never both see "under quota".
pub struct InteractionBudget {
    limits: BudgetLimits,
    windows: Windows,
    store: Box<dyn StateStore<BudgetLedger>>,
    state: Mutex<LedgerState>,
    stats: Arc<Stats>,
}

impl InteractionBudget {
    pub fn new(
        limits: BudgetLimits,
        store: Box<dyn StateStore<BudgetLedger>>,
        stats: Arc<Stats>,
    ) -> Result<Self, ConfigError> {
        limits.validate()?;
        let windows = Windows::from_limits(&limits)?;
        Ok(Self {
            limits,
            windows,
            store,
            state: Mutex::new(LedgerState {
                ledger: BudgetLedger::default(),
                unsaved: false,
            }),
            stats,
        })
    }

    /// Decide for `subject_id` now, recording the event if allowed.
    pub fn check_and_reserve(&self, subject_id: &str, subject_label: &str) -> BudgetDecision {
        self.check_and_reserve_at(subject_id, subject_label, Utc::now())
    }

    /// Decide as of `now`. Every comparison in one decision uses this instant.
    pub fn check_and_reserve_at(
        &self,
        subject_id: &str,
        subject_label: &str,
        now: DateTime<Utc>,
    ) -> BudgetDecision {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        self.refresh(&mut state);
        state
            .ledger
            .purge(now, self.windows.retention, self.windows.spam);

        let decision = self.decide(&mut state.ledger, subject_id, subject_label, now);
        self.persist(&mut state);

        self.stats.record_budget(decision.allowed);
        decision
    }

    /// Copy of the in-memory ledger after the last decision.
    pub fn snapshot(&self) -> BudgetLedger {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .ledger
            .clone()
    }

    fn refresh(&self, state: &mut LedgerState) {
        if state.unsaved {
            return;
        }
        match self.store.load() {
            Ok(ledger) => state.ledger = ledger,
            Err(e) => warn!(
                store = %self.store.describe(),
                error = %e,
                "Failed to load interaction ledger, using in-memory copy"
            ),
        }
    }

    fn persist(&self, state: &mut LedgerState) {
        match self.store.save(&state.ledger) {
            Ok(()) => state.unsaved = false,
            Err(e) => {
                warn!(
                    store = %self.store.describe(),
                    error = %e,
                    "Failed to save interaction ledger, keeping in-memory decision"
                );
                state.unsaved = true;
            }
        }
    }

    fn decide(
        &self,
        ledger: &mut BudgetLedger,
        subject: &str,
        label: &str,
        now: DateTime<Utc>,
    ) -> BudgetDecision {
        let limits = &self.limits;

        if let Some(until) = ledger.suspended_until(subject, now) {
            let remaining_minutes = ceil_minutes(until - now);
            debug!(subject = %subject, remaining_minutes, "Subject suspended");
            return deny(
                Denial::Suspended { remaining_minutes },
                format!("@{label} suspended for spam ({remaining_minutes} min remaining)"),
            );
        }

        ledger.record_request(subject, now);
        let requests = ledger.requests_within(subject, now, self.windows.spam);
        if requests >= limits.spam_threshold {
            let suspended_minutes = ceil_minutes(self.windows.suspension);
            ledger.suspend(subject, now + self.windows.suspension);
            self.stats.record_suspension();
            info!(
                subject = %subject,
                requests,
                suspended_minutes,
                "Spam burst detected, subject suspended"
            );
            return deny(
                Denial::SpamDetected {
                    requests,
                    suspended_minutes,
                },
                format!(
                    "spam detected from @{label} ({requests} requests in {} min), suspended for {suspended_minutes} min",
                    ceil_minutes(self.windows.spam)
                ),
            );
        }

        let subject_hour = ledger.subject_events_within(subject, now, self.windows.hour);
        if subject_hour >= limits.subject_per_hour {
            return deny(
                Denial::SubjectHourly {
                    count: subject_hour,
                    limit: limits.subject_per_hour,
                },
                format!(
                    "@{label} already got {subject_hour} replies this hour (max {})",
                    limits.subject_per_hour
                ),
            );
        }

        let subject_day = ledger.subject_events_within(subject, now, self.windows.retention);
        if subject_day >= limits.subject_per_day {
            return deny(
                Denial::SubjectDaily {
                    count: subject_day,
                    limit: limits.subject_per_day,
                },
                format!(
                    "@{label} already got {subject_day} replies today (max {})",
                    limits.subject_per_day
                ),
            );
        }

        let global_hour = ledger.total_events_within(now, self.windows.hour);
        if global_hour >= limits.global_per_hour {
            return deny(
                Denial::GlobalHourly {
                    count: global_hour,
                    limit: limits.global_per_hour,
                },
                format!(
                    "global hourly reply limit reached ({global_hour}/{})",
                    limits.global_per_hour
                ),
            );
        }

        let global_day = ledger.total_events_within(now, self.windows.retention);
        if global_day >= limits.global_per_day {
            return deny(
                Denial::GlobalDaily {
                    count: global_day,
                    limit: limits.global_per_day,
                },
                format!(
                    "global daily reply limit reached ({global_day}/{})",
                    limits.global_per_day
                ),
            );
        }

        ledger.record_event(subject, now);
        debug!(subject = %subject, hour_count = subject_hour + 1, "Reply reserved");
        BudgetDecision {
            allowed: true,
            reason: format!(
                "reply allowed to @{label} ({}/{} this hour)",
                subject_hour + 1,
                limits.subject_per_hour
            ),
            denial: None,
        }
    }
}

fn deny(denial: Denial, reason: String) -> BudgetDecision {
    debug!(reason = %reason, "Reply denied by budget");
    BudgetDecision {
        allowed: false,
        reason,
        denial: Some(denial),
    }
}

fn ceil_minutes(delta: TimeDelta) -> i64 {
    let secs = delta.num_seconds().max(0);
    (secs + 59) / 60
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn budget_with(store: Arc<MemoryStore<BudgetLedger>>) -> InteractionBudget {
        InteractionBudget::new(
            BudgetLimits::default(),
            Box::new(store),
            Arc::new(Stats::new()),
        )
        .unwrap()
    }

    fn budget() -> InteractionBudget {
        budget_with(Arc::new(MemoryStore::new()))
    }

    fn minutes(m: i64) -> TimeDelta {
        TimeDelta::minutes(m)
    }

    #[test]
    fn fourth_reply_in_an_hour_is_denied() {
        let b = budget();
        let t0 = Utc::now();
        for i in 0..3 {
            let d = b.check_and_reserve_at("u1", "alice", t0 + minutes(15 * i));
            assert!(d.allowed, "call {i}: {}", d.reason);
        }
        let d = b.check_and_reserve_at("u1", "alice", t0 + minutes(50));
        assert!(!d.allowed);
        assert!(matches!(
            d.denial,
            Some(Denial::SubjectHourly { count: 3, limit: 3 })
        ));
    }

    #[test]
    fn hourly_window_slides() {
        let b = budget();
        let t0 = Utc::now();
        for i in 0..3 {
            assert!(b.check_and_reserve_at("u1", "alice", t0 + minutes(15 * i)).allowed);
        }
        assert!(b.check_and_reserve_at("u1", "alice", t0 + minutes(61)).allowed);
    }

    #[test]
    fn burst_triggers_suspension() {
        let b = budget();
        let t0 = Utc::now();
        let mut decisions = Vec::new();
        for i in 0..5 {
            decisions.push(b.check_and_reserve_at("spammer", "bot", t0 + minutes(i)));
        }
        assert!(decisions[..3].iter().all(|d| d.allowed));
        assert!(matches!(
            decisions[4].denial,
            Some(Denial::SpamDetected { requests: 5, .. })
        ));

        let sixth = b.check_and_reserve_at("spammer", "bot", t0 + minutes(4 + 29));
        assert!(!sixth.allowed);
        assert!(matches!(sixth.denial, Some(Denial::Suspended { .. })));
        assert!(sixth.reason.contains("suspended"));
    }

    #[test]
    fn suspension_ignores_other_counters_and_lifts() {
        let b = budget();
        let t0 = Utc::now();
        for i in 0..5 {
            b.check_and_reserve_at("s", "s", t0 + minutes(i));
        }
        // Still inside the 30 minute suspension.
        let d = b.check_and_reserve_at("s", "s", t0 + minutes(20));
        assert!(matches!(
            d.denial,
            Some(Denial::Suspended {
                remaining_minutes: 14
            })
        ));

        // Suspension is 30 min from the 5th request, and the hourly events
        // from the first burst have aged out by then.
        let d = b.check_and_reserve_at("s", "s", t0 + minutes(4 + 31 + 60));
        assert!(d.allowed, "{}", d.reason);
    }

    #[test]
    fn suspended_request_does_not_consume_counters() {
        let b = budget();
        let t0 = Utc::now();
        for i in 0..5 {
            b.check_and_reserve_at("s", "s", t0 + minutes(i));
        }
        let before = b.snapshot();
        b.check_and_reserve_at("s", "s", t0 + minutes(10));
        let after = b.snapshot();
        assert_eq!(before.total_events, after.total_events);
        assert_eq!(before.per_subject_events, after.per_subject_events);
    }

    #[test]
    fn daily_subject_quota() {
        let b = budget();
        let t0 = Utc::now();
        for i in 0..8 {
            let d = b.check_and_reserve_at("u", "u", t0 + minutes(65 * i));
            assert!(d.allowed, "call {i}: {}", d.reason);
        }
        let d = b.check_and_reserve_at("u", "u", t0 + minutes(65 * 8));
        assert!(matches!(d.denial, Some(Denial::SubjectDaily { count: 8, .. })));
    }

    #[test]
    fn global_hourly_quota_spans_subjects() {
        let b = budget();
        let t0 = Utc::now();
        for i in 0..10 {
            let d = b.check_and_reserve_at(&format!("u{i}"), "x", t0 + minutes(i));
            assert!(d.allowed);
        }
        let d = b.check_and_reserve_at("fresh", "fresh", t0 + minutes(11));
        assert!(matches!(d.denial, Some(Denial::GlobalHourly { count: 10, .. })));
    }

    #[test]
    fn global_daily_quota() {
        let b = budget();
        let t0 = Utc::now();
        // 5 per hour across distinct subjects, 10 hours.
        for h in 0..10 {
            for k in 0..5 {
                let subject = format!("u{h}-{k}");
                let d = b.check_and_reserve_at(&subject, "x", t0 + minutes(h * 60 + k));
                assert!(d.allowed, "{}", d.reason);
            }
        }
        let d = b.check_and_reserve_at("late", "late", t0 + minutes(10 * 60 + 5));
        assert!(matches!(d.denial, Some(Denial::GlobalDaily { count: 50, .. })));
    }

    #[test]
    fn decisions_survive_restart() {
        let store = Arc::new(MemoryStore::new());
        let t0 = Utc::now();
        {
            let b = budget_with(Arc::clone(&store));
            for i in 0..3 {
                assert!(b.check_and_reserve_at("u", "u", t0 + minutes(i)).allowed);
            }
        }
        let b = budget_with(Arc::clone(&store));
        assert!(!b.check_and_reserve_at("u", "u", t0 + minutes(5)).allowed);
    }

    #[test]
    fn save_failure_keeps_in_memory_decision() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_saves(true);
        let b = budget_with(Arc::clone(&store));
        let t0 = Utc::now();
        for i in 0..3 {
            assert!(b.check_and_reserve_at("u", "u", t0 + minutes(i)).allowed);
        }
        assert!(!b.check_and_reserve_at("u", "u", t0 + minutes(4)).allowed);
        assert_eq!(store.save_count(), 0);
        assert!(store.current().total_events.is_empty());
    }

    #[test]
    fn load_failure_falls_back_to_memory() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_loads(true);
        let b = budget_with(Arc::clone(&store));
        let t0 = Utc::now();
        for i in 0..3 {
            assert!(b.check_and_reserve_at("u", "u", t0 + minutes(i)).allowed);
        }
        assert!(!b.check_and_reserve_at("u", "u", t0 + minutes(4)).allowed);
    }

    #[test]
    fn stale_entries_are_purged_before_deciding() {
        let t0 = Utc::now();
        let mut old = BudgetLedger::default();
        for i in 0..8 {
            old.record_event("u", t0 - TimeDelta::hours(25) + minutes(i));
        }
        let store = Arc::new(MemoryStore::with_value(old));
        let b = budget_with(Arc::clone(&store));
        assert!(b.check_and_reserve_at("u", "u", t0).allowed);
        assert_eq!(store.current().total_events.len(), 1);
    }

    #[test]
    fn concurrent_requests_never_exceed_quota() {
        let b = Arc::new(budget());
        let now = Utc::now();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let b = Arc::clone(&b);
                std::thread::spawn(move || b.check_and_reserve_at("same", "same", now).allowed)
            })
            .collect();
        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(granted, 3);
    }
}
