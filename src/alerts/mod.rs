//! Alert and event data model
//!
//! Rows come from the external backend: an `alerts` table (one row per
//! detected occurrence requiring attention, with a lifecycle status) and an
//! `events` table (the underlying detection, e.g. a fall). Ids in `events`
//! and `alerts.trigger_event` arrive as JSON strings or numbers depending on
//! the producer, so all comparisons go through the stringified form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod reconcile;

/// Status value the backend writes when an alert has been dismissed.
pub const STATUS_DISMISSED: &str = "dismissed";

/// An identifier that may arrive as a JSON string or number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    /// Stringified form used for all id comparisons and cache keys.
    pub fn as_key(&self) -> String {
        match self {
            RawId::Text(s) => s.clone(),
            RawId::Number(n) => n.to_string(),
        }
    }
}

/// One row of the `alerts` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Free text; "active", "dismissed" and others are possible.
    pub status: String,
    /// Foreign id into the events table (string or number).
    pub trigger_event: RawId,
    pub user_id: String,
}

/// One row of the `events` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: RawId,
    /// Free-text category, e.g. "fall_detected".
    #[serde(rename = "type")]
    pub kind: String,
}

/// An alert joined with its resolved event, if the event id matched a row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertWithEvent {
    pub alert: Alert,
    pub event: Option<Event>,
}

impl AlertWithEvent {
    /// Stringified trigger-event id (media cache key).
    pub fn event_key(&self) -> String {
        self.alert.trigger_event.as_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_id_string_and_number_compare_equal_as_keys() {
        let a: RawId = serde_json::from_str("42").unwrap();
        let b: RawId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(a.as_key(), "42");
        assert_eq!(a.as_key(), b.as_key());
    }

    #[test]
    fn test_alert_deserializes_backend_row() {
        let row = r#"{
            "id": "a-1",
            "created_at": "2026-02-01T08:30:00+00:00",
            "status": "active",
            "trigger_event": 7,
            "user_id": "user-1"
        }"#;
        let alert: Alert = serde_json::from_str(row).unwrap();
        assert_eq!(alert.id, "a-1");
        assert_eq!(alert.status, "active");
        assert_eq!(alert.trigger_event.as_key(), "7");
    }

    #[test]
    fn test_event_type_field_maps_to_kind() {
        let row = r#"{"id": "7", "type": "fall_detected"}"#;
        let event: Event = serde_json::from_str(row).unwrap();
        assert_eq!(event.kind, "fall_detected");
        assert_eq!(event.id.as_key(), "7");
    }
}
