use std::collections::HashMap;

use derive_more::From;
use serde::{Deserialize, Serialize};

use crate::{SdkMetadata, User};

/// Reserved event name for gate exposures.
pub const GATE_EXPOSURE_EVENT: &str = "gatekit::gate_exposure";
/// Reserved event name for dynamic config exposures.
pub const CONFIG_EXPOSURE_EVENT: &str = "gatekit::config_exposure";

/// Optional value attached to a custom event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From)]
#[serde(untagged)]
pub enum EventValue {
    /// A numerical value (e.g., price).
    Number(f64),
    /// A string value (e.g., SKU).
    String(String),
}

impl From<&str> for EventValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// A telemetry event waiting to be delivered. Events are immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Name of the event, e.g. `"purchase"` or one of the reserved exposure names.
    pub event_name: String,
    /// Optional value attached by the caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<EventValue>,
    /// Free-form string attributes of the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
    /// User the event was logged for, with private attributes removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    /// Milliseconds since Unix epoch, stamped when the event was created.
    pub time: i64,
}

impl Event {
    /// Create a new event stamped with the current time.
    pub fn new(
        event_name: impl Into<String>,
        value: Option<EventValue>,
        metadata: Option<HashMap<String, String>>,
        user: Option<&User>,
    ) -> Event {
        Event {
            event_name: event_name.into(),
            value,
            metadata,
            user: user.map(User::for_logging),
            time: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub(crate) fn gate_exposure(gate: &str, value: bool, rule_id: &str, user: &User) -> Event {
        let metadata = [
            ("gate".to_owned(), gate.to_owned()),
            ("gateValue".to_owned(), value.to_string()),
            ("ruleID".to_owned(), rule_id.to_owned()),
        ]
        .into_iter()
        .collect();
        Event::new(GATE_EXPOSURE_EVENT, None, Some(metadata), Some(user))
    }

    pub(crate) fn config_exposure(config: &str, group: &str, rule_id: &str, user: &User) -> Event {
        let metadata = [
            ("config".to_owned(), config.to_owned()),
            ("configGroup".to_owned(), group.to_owned()),
            ("ruleID".to_owned(), rule_id.to_owned()),
        ]
        .into_iter()
        .collect();
        Event::new(CONFIG_EXPOSURE_EVENT, None, Some(metadata), Some(user))
    }
}

/// Request body of the `log_event` endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LogEventRequest<'a> {
    pub events: &'a [Event],
    #[serde(rename = "gatekitMetadata")]
    pub metadata: &'a SdkMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_exposure_carries_gate_metadata() {
        let user = User::with_user_id("u1");

        let event = Event::gate_exposure("new_checkout", true, "rule-1", &user);

        assert_eq!(event.event_name, GATE_EXPOSURE_EVENT);
        let metadata = event.metadata.unwrap();
        assert_eq!(metadata["gate"], "new_checkout");
        assert_eq!(metadata["gateValue"], "true");
        assert_eq!(metadata["ruleID"], "rule-1");
        assert_eq!(event.user, Some(user));
    }

    #[test]
    fn config_exposure_carries_group() {
        let event = Event::config_exposure("pricing", "control", "rule-2", &User::default());

        let metadata = event.metadata.unwrap();
        assert_eq!(metadata["config"], "pricing");
        assert_eq!(metadata["configGroup"], "control");
    }

    #[test]
    fn serializes_without_empty_fields() {
        let mut event = Event::new("purchase", Some(9.99.into()), None, None);
        event.time = 1;

        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"eventName": "purchase", "value": 9.99, "time": 1})
        );
    }
}
