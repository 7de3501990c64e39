//! Inbound repository-event wire shape (§6): the messages the Ingest loop
//! (C8) pulls and C1 filters.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Modified,
    #[serde(other)]
    Other,
}

/// Raw event as received from the external messaging source (§6): `id`,
/// `timestamp`, `type`, `resource-type` (comma-separated URI list),
/// `object.agent.name`, and the JSON `payload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestEvent {
    pub id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Comma-delimited URI list, kept as the raw wire string; C1 splits it.
    #[serde(rename = "resource-type")]
    pub resource_type: String,
    pub object: EventObject,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventObject {
    pub agent: EventAgent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAgent {
    pub name: String,
}

impl IngestEvent {
    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.resource_type.split(',').map(str::trim)
    }
}
