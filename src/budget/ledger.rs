//! Persisted interaction ledger.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Event timestamps per subject and globally, plus active suspensions.
///
/// Every timestamp older than the retention window is purged on load,
/// before any decision reads the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLedger {
    /// Granted replies per subject, oldest first.
    #[serde(default)]
    pub per_subject_events: BTreeMap<String, Vec<DateTime<Utc>>>,
    /// Granted replies across all subjects, oldest first.
    #[serde(default)]
    pub total_events: Vec<DateTime<Utc>>,
    /// Subject id → time the suspension lifts.
    #[serde(default)]
    pub suspensions: BTreeMap<String, DateTime<Utc>>,
    /// Every request per subject (granted or not), for burst detection.
    #[serde(default)]
    pub recent_requests: BTreeMap<String, Vec<DateTime<Utc>>>,
}

impl BudgetLedger {
    /// Drop events older than `retention`, requests older than `request_window`,
    /// and suspensions that have lifted.
    pub fn purge(&mut self, now: DateTime<Utc>, retention: TimeDelta, request_window: TimeDelta) {
        let cutoff = now - retention;
        for events in self.per_subject_events.values_mut() {
            events.retain(|t| *t > cutoff);
        }
        self.per_subject_events.retain(|_, events| !events.is_empty());
        self.total_events.retain(|t| *t > cutoff);

        let request_cutoff = now - request_window;
        for requests in self.recent_requests.values_mut() {
            requests.retain(|t| *t > request_cutoff);
        }
        self.recent_requests.retain(|_, requests| !requests.is_empty());

        self.suspensions.retain(|_, until| *until > now);
    }

    /// Active suspension end for `subject`, if any.
    pub fn suspended_until(&self, subject: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.suspensions
            .get(subject)
            .copied()
            .filter(|until| *until > now)
    }

    /// Granted events for `subject` inside the trailing `window`.
    pub fn subject_events_within(
        &self,
        subject: &str,
        now: DateTime<Utc>,
        window: TimeDelta,
    ) -> usize {
        self.per_subject_events
            .get(subject)
            .map(|events| count_within(events, now, window))
            .unwrap_or(0)
    }

    /// Granted events across all subjects inside the trailing `window`.
    pub fn total_events_within(&self, now: DateTime<Utc>, window: TimeDelta) -> usize {
        count_within(&self.total_events, now, window)
    }

    /// Requests from `subject` inside the trailing `window`.
    pub fn requests_within(&self, subject: &str, now: DateTime<Utc>, window: TimeDelta) -> usize {
        self.recent_requests
            .get(subject)
            .map(|requests| count_within(requests, now, window))
            .unwrap_or(0)
    }

    pub(crate) fn record_request(&mut self, subject: &str, now: DateTime<Utc>) {
        self.recent_requests
            .entry(subject.to_string())
            .or_default()
            .push(now);
    }

    pub(crate) fn record_event(&mut self, subject: &str, now: DateTime<Utc>) {
        self.per_subject_events
            .entry(subject.to_string())
            .or_default()
            .push(now);
        self.total_events.push(now);
    }

    pub(crate) fn suspend(&mut self, subject: &str, until: DateTime<Utc>) {
        self.suspensions.insert(subject.to_string(), until);
    }
}

fn count_within(events: &[DateTime<Utc>], now: DateTime<Utc>, window: TimeDelta) -> usize {
    let cutoff = now - window;
    events.iter().filter(|t| **t > cutoff).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(minutes_ago: i64, now: DateTime<Utc>) -> DateTime<Utc> {
        now - TimeDelta::minutes(minutes_ago)
    }

    #[test]
    fn purge_drops_old_events_and_lifted_suspensions() {
        let now = Utc::now();
        let mut ledger = BudgetLedger::default();
        ledger
            .per_subject_events
            .insert("a".into(), vec![at(25 * 60, now), at(30, now)]);
        ledger
            .per_subject_events
            .insert("b".into(), vec![at(48 * 60, now)]);
        ledger.total_events = vec![at(25 * 60, now), at(48 * 60, now), at(30, now)];
        ledger.suspensions.insert("a".into(), at(1, now));
        ledger.suspensions.insert("c".into(), now + TimeDelta::minutes(5));
        ledger
            .recent_requests
            .insert("a".into(), vec![at(11, now), at(2, now)]);

        ledger.purge(now, TimeDelta::hours(24), TimeDelta::minutes(10));

        assert_eq!(ledger.per_subject_events.len(), 1);
        assert_eq!(ledger.per_subject_events["a"], vec![at(30, now)]);
        assert_eq!(ledger.total_events, vec![at(30, now)]);
        assert!(!ledger.suspensions.contains_key("a"));
        assert!(ledger.suspensions.contains_key("c"));
        assert_eq!(ledger.recent_requests["a"], vec![at(2, now)]);
    }

    #[test]
    fn windows_count_only_recent_events() {
        let now = Utc::now();
        let mut ledger = BudgetLedger::default();
        for m in [5, 30, 90, 600] {
            ledger.record_event("a", at(m, now));
        }
        assert_eq!(ledger.subject_events_within("a", now, TimeDelta::hours(1)), 2);
        assert_eq!(ledger.subject_events_within("a", now, TimeDelta::hours(24)), 4);
        assert_eq!(ledger.total_events_within(now, TimeDelta::minutes(10)), 1);
        assert_eq!(ledger.subject_events_within("nobody", now, TimeDelta::hours(1)), 0);
    }

    #[test]
    fn old_file_without_request_log_still_loads() {
        let json = r#"{"per_subject_events":{},"total_events":[],"suspensions":{}}"#;
        let ledger: BudgetLedger = serde_json::from_str(json).unwrap();
        assert!(ledger.recent_requests.is_empty());
    }
}
