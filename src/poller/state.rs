//! Shared dashboard state
//!
//! [`Dashboard`] is the single mutable surface shared between the polling
//! task, dismiss actions, and whatever view renders the snapshot. Every
//! commit is guarded twice: by the identity generation (a fetch started for
//! a superseded identity must not mutate state) and by a per-generation
//! sequence number (a result older than one already applied is discarded
//! rather than reordered).

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::alerts::reconcile::{has_new_ids, id_snapshot};
use crate::alerts::AlertWithEvent;

/// View-facing snapshot of the dashboard.
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    /// Active alerts joined with event metadata, newest first.
    pub alerts: Vec<AlertWithEvent>,
    /// Last fetch or dismiss error, human readable. Cleared by the next
    /// successful fetch.
    pub error: Option<String>,
    /// True only until the first fetch of a session completes, so
    /// background polls never flicker the view.
    pub loading: bool,
    /// Alert ids with an outstanding dismiss request. Invariant: every id
    /// inserted here is removed on every exit path of the dismiss action.
    pub dismissing: HashSet<String>,
}

/// Outcome of committing a poll result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// Result applied; `arrivals` is true when the batch contained at least
    /// one alert id not in the previous snapshot (never on the first fetch
    /// of an identity).
    Applied { arrivals: bool },
    /// Result belonged to a superseded identity or arrived out of order;
    /// state was left untouched.
    Stale,
}

#[derive(Debug, Default)]
struct Inner {
    state: DashboardState,
    /// Alert ids of the most recent successful fetch; exactly that batch,
    /// never accumulated history.
    seen_ids: HashSet<String>,
    /// True once the first successful fetch of this identity seeded the
    /// seen-id set.
    seeded: bool,
    generation: u64,
    last_applied_seq: u64,
}

/// Handle to the shared state. Cheap to clone; all clones observe the same
/// dashboard.
#[derive(Clone, Default)]
pub struct Dashboard {
    inner: Arc<Mutex<Inner>>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a (new) identity: clears the seen-id set and first-load
    /// flag and invalidates all in-flight fetches of the previous identity.
    /// Returns the new generation, which every subsequent commit must carry.
    pub fn begin_identity(&self) -> u64 {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        inner.generation += 1;
        inner.seen_ids.clear();
        inner.seeded = false;
        inner.last_applied_seq = 0;
        inner.state = DashboardState {
            loading: true,
            ..DashboardState::default()
        };
        inner.generation
    }

    pub fn snapshot(&self) -> DashboardState {
        self.inner
            .lock()
            .map(|inner| inner.state.clone())
            .unwrap_or_default()
    }

    /// Apply a successful fetch. Replaces the alert list and the seen-id
    /// set, clears error and loading. Stale generations and out-of-order
    /// sequences are discarded without touching state.
    pub fn commit_success(&self, generation: u64, seq: u64, batch: Vec<AlertWithEvent>) -> Commit {
        let Ok(mut inner) = self.inner.lock() else {
            return Commit::Stale;
        };
        if generation != inner.generation || seq <= inner.last_applied_seq {
            return Commit::Stale;
        }

        let arrivals = inner.seeded && has_new_ids(&inner.seen_ids, &batch);
        inner.seen_ids = id_snapshot(&batch);
        inner.seeded = true;
        inner.last_applied_seq = seq;
        inner.state.alerts = batch;
        inner.state.error = None;
        inner.state.loading = false;

        Commit::Applied { arrivals }
    }

    /// Record a fetch failure: the error string is surfaced, everything
    /// else (alert list, seen-id set) keeps its last-known value. Does not
    /// advance the applied sequence, so a slow success may still land.
    pub fn commit_failure(&self, generation: u64, seq: u64, message: String) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if generation != inner.generation || seq <= inner.last_applied_seq {
            return;
        }
        inner.state.error = Some(message);
        inner.state.loading = false;
    }

    /// Mark an alert as having an outstanding dismiss request. Returns the
    /// current generation, which the completion must carry, or None when a
    /// request is already outstanding for this id.
    pub fn begin_dismiss(&self, alert_id: &str) -> Option<u64> {
        let Ok(mut inner) = self.inner.lock() else {
            return None;
        };
        if !inner.state.dismissing.insert(alert_id.to_string()) {
            return None;
        }
        Some(inner.generation)
    }

    /// Clear the dismiss busy flag. Must run on every exit path of the
    /// dismiss action.
    pub fn finish_dismiss(&self, alert_id: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.state.dismissing.remove(alert_id);
        }
    }

    pub fn is_dismissing(&self, alert_id: &str) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.state.dismissing.contains(alert_id))
            .unwrap_or(false)
    }

    /// Optimistically drop a dismissed alert from the active list. The next
    /// poll confirms independently via the status filter. A completion from
    /// a superseded identity is discarded.
    pub fn remove_alert(&self, generation: u64, alert_id: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            if generation != inner.generation {
                return;
            }
            inner.state.alerts.retain(|entry| entry.alert.id != alert_id);
        }
    }

    /// Surface an action error. Same generation guard as [`Dashboard::remove_alert`]:
    /// a dismiss failing after the identity changed must not leak its error
    /// into the new session.
    pub fn set_error(&self, generation: u64, message: String) {
        if let Ok(mut inner) = self.inner.lock() {
            if generation != inner.generation {
                return;
            }
            inner.state.error = Some(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{Alert, RawId};
    use chrono::Utc;

    fn entry(id: &str) -> AlertWithEvent {
        AlertWithEvent {
            alert: Alert {
                id: id.to_string(),
                created_at: Utc::now(),
                status: "active".to_string(),
                trigger_event: RawId::Number(1),
                user_id: "user-1".to_string(),
            },
            event: None,
        }
    }

    #[test]
    fn test_first_commit_seeds_without_arrivals() {
        let dashboard = Dashboard::new();
        let generation = dashboard.begin_identity();
        assert!(dashboard.snapshot().loading);

        let commit = dashboard.commit_success(generation, 1, vec![entry("A"), entry("B")]);
        assert_eq!(commit, Commit::Applied { arrivals: false });

        let state = dashboard.snapshot();
        assert_eq!(state.alerts.len(), 2);
        assert!(!state.loading);
        assert!(state.error.is_none());
    }

    #[test]
    fn test_new_id_reports_arrivals_once_per_batch() {
        let dashboard = Dashboard::new();
        let generation = dashboard.begin_identity();
        dashboard.commit_success(generation, 1, vec![entry("A"), entry("B")]);

        // {A,B} -> {A,B,C}: one arrival signal for the whole batch.
        let commit =
            dashboard.commit_success(generation, 2, vec![entry("A"), entry("B"), entry("C")]);
        assert_eq!(commit, Commit::Applied { arrivals: true });

        // Unchanged batch: no arrival.
        let commit =
            dashboard.commit_success(generation, 3, vec![entry("A"), entry("B"), entry("C")]);
        assert_eq!(commit, Commit::Applied { arrivals: false });
    }

    #[test]
    fn test_failure_preserves_alerts_and_seen_ids() {
        let dashboard = Dashboard::new();
        let generation = dashboard.begin_identity();
        dashboard.commit_success(generation, 1, vec![entry("A")]);

        dashboard.commit_failure(generation, 2, "Failed to load alerts".to_string());
        let state = dashboard.snapshot();
        assert_eq!(state.alerts.len(), 1);
        assert_eq!(state.error.as_deref(), Some("Failed to load alerts"));

        // Seen-id set was not updated by the failure: A is still known.
        let commit = dashboard.commit_success(generation, 3, vec![entry("A")]);
        assert_eq!(commit, Commit::Applied { arrivals: false });
    }

    #[test]
    fn test_stale_generation_is_discarded() {
        let dashboard = Dashboard::new();
        let old_generation = dashboard.begin_identity();
        dashboard.commit_success(old_generation, 1, vec![entry("A")]);

        let new_generation = dashboard.begin_identity();
        assert_ne!(old_generation, new_generation);

        // Response from the superseded identity lands late.
        let commit = dashboard.commit_success(old_generation, 2, vec![entry("Z")]);
        assert_eq!(commit, Commit::Stale);
        assert!(dashboard.snapshot().alerts.is_empty());

        // First fetch of the new identity never reports arrivals, even when
        // ids overlap with the previous user's.
        let commit = dashboard.commit_success(new_generation, 1, vec![entry("A")]);
        assert_eq!(commit, Commit::Applied { arrivals: false });
    }

    #[test]
    fn test_out_of_order_result_is_discarded() {
        let dashboard = Dashboard::new();
        let generation = dashboard.begin_identity();

        dashboard.commit_success(generation, 2, vec![entry("A"), entry("B")]);
        let commit = dashboard.commit_success(generation, 1, vec![entry("A")]);
        assert_eq!(commit, Commit::Stale);
        assert_eq!(dashboard.snapshot().alerts.len(), 2);

        // A late failure from the older request is also discarded.
        dashboard.commit_failure(generation, 1, "late".to_string());
        assert!(dashboard.snapshot().error.is_none());
    }

    #[test]
    fn test_dismiss_busy_flag_round_trip() {
        let dashboard = Dashboard::new();
        assert!(dashboard.begin_dismiss("A").is_some());
        assert!(dashboard.is_dismissing("A"));
        // Double submission is refused while outstanding.
        assert!(dashboard.begin_dismiss("A").is_none());
        dashboard.finish_dismiss("A");
        assert!(!dashboard.is_dismissing("A"));
        assert!(dashboard.begin_dismiss("A").is_some());
    }

    #[test]
    fn test_remove_alert_only_touches_matching_id() {
        let dashboard = Dashboard::new();
        let generation = dashboard.begin_identity();
        dashboard.commit_success(generation, 1, vec![entry("A"), entry("B")]);

        dashboard.remove_alert(generation, "A");
        let state = dashboard.snapshot();
        assert_eq!(state.alerts.len(), 1);
        assert_eq!(state.alerts[0].alert.id, "B");
    }

    #[test]
    fn test_dismiss_completion_for_old_identity_is_discarded() {
        let dashboard = Dashboard::new();
        let old_generation = dashboard.begin_identity();
        dashboard.commit_success(old_generation, 1, vec![entry("A")]);
        let dismiss_generation = dashboard.begin_dismiss("A").unwrap();
        assert_eq!(dismiss_generation, old_generation);

        // Identity changes while the dismiss is still in flight.
        let new_generation = dashboard.begin_identity();
        dashboard.commit_success(new_generation, 1, vec![entry("A")]);

        // Both completion shapes from the old identity land late: neither
        // may touch the new session.
        dashboard.set_error(dismiss_generation, "Failed to dismiss alert".to_string());
        dashboard.remove_alert(dismiss_generation, "A");
        dashboard.finish_dismiss("A");

        let state = dashboard.snapshot();
        assert!(state.error.is_none());
        assert_eq!(state.alerts.len(), 1);
    }
}
