use serde::{Deserialize, Serialize};

use crate::models::StatusId;

/// Events pushed to timeline streaming subscribers.
///
/// Serialized as `{"event": "...", "payload": "..."}`. Subscribers match
/// on the exact shape, so no extra fields may be added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "lowercase")]
pub enum StreamEvent {
    /// A status was removed. Payload is the decimal status id.
    Delete(String),
}

impl StreamEvent {
    pub fn delete(id: StatusId) -> Self {
        Self::Delete(id.to_string())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_wire_format() {
        let json = StreamEvent::delete(StatusId(103_270_115_826_048_975)).to_json().unwrap();
        assert_eq!(json, r#"{"event":"delete","payload":"103270115826048975"}"#);
    }

    #[test]
    fn test_delete_parses_back() {
        let event: StreamEvent = serde_json::from_str(r#"{"event":"delete","payload":"7"}"#).unwrap();
        assert_eq!(event, StreamEvent::delete(StatusId(7)));
    }
}
