//! Build event types

use serde::{Deserialize, Serialize};

/// One frame of a build's event log
///
/// Payloads are opaque to the engine; it persists and replays them verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub version: String,
    pub payload: serde_json::Value,
}

/// An event as persisted, carrying its per-build sequence number
///
/// `event_id` is strictly increasing within a build; `(build_id, event_id)`
/// is unique. Rows are immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedEvent {
    pub build_id: i64,
    pub event_id: i64,
    #[serde(flatten)]
    pub event: Event,
}
