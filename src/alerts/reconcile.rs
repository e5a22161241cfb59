//! Snapshot reconciliation
//!
//! The poller keeps the set of alert ids from the most recent successful
//! fetch (never accumulated history). Arrival detection is a set difference
//! against that snapshot; the event join is a client-side hash join keyed on
//! stringified ids.

use std::collections::{HashMap, HashSet};

use super::{Alert, AlertWithEvent, Event};

/// True if any alert in `latest` was not present in the previous snapshot.
pub fn has_new_ids(previous: &HashSet<String>, latest: &[AlertWithEvent]) -> bool {
    latest
        .iter()
        .any(|entry| !previous.contains(&entry.alert.id))
}

/// The id set of a fetched batch, used to replace the previous snapshot.
pub fn id_snapshot(latest: &[AlertWithEvent]) -> HashSet<String> {
    latest
        .iter()
        .map(|entry| entry.alert.id.clone())
        .collect()
}

/// Distinct trigger-event ids of a batch, in first-appearance order.
pub fn distinct_event_ids(alerts: &[Alert]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for alert in alerts {
        let key = alert.trigger_event.as_key();
        if seen.insert(key.clone()) {
            ids.push(key);
        }
    }
    ids
}

/// Join alerts with event metadata by stringified id. Alerts whose trigger
/// id has no matching event row keep `event: None`.
pub fn join_events(alerts: Vec<Alert>, events: &[Event]) -> Vec<AlertWithEvent> {
    let by_id: HashMap<String, &Event> = events
        .iter()
        .map(|event| (event.id.as_key(), event))
        .collect();

    alerts
        .into_iter()
        .map(|alert| {
            let event = by_id.get(&alert.trigger_event.as_key()).map(|e| (*e).clone());
            AlertWithEvent { alert, event }
        })
        .collect()
}
