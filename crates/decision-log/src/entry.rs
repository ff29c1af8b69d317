use serde::{Deserialize, Serialize};

use relay_core::Message;

/// A single log record describing one event in the review pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: uuid::Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event: DecisionEvent,
    /// Sequence number of the message involved, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// CRC-64 integrity tag of the message involved, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity_tag: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub details: serde_json::Value,
}

impl DecisionRecord {
    /// Create a record with an auto-generated UUID v4 and the current UTC
    /// timestamp.  Message fields default to `None`; attach them with
    /// [`with_message`](Self::with_message).
    pub fn new(event: DecisionEvent, details: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            event,
            sequence: None,
            integrity_tag: None,
            source: None,
            destination: None,
            details,
        }
    }

    /// Attach a message's identity to this record, consuming and returning
    /// `self` for builder-style usage.
    pub fn with_message(mut self, message: &Message) -> Self {
        self.sequence = Some(message.sequence);
        self.integrity_tag = Some(message.integrity_tag);
        self.source = Some(message.source.clone());
        self.destination = Some(message.destination.clone());
        self
    }
}

/// The category of event being recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionEvent {
    ReviewStarted,
    ReviewStopped,
    MessageIntercepted,
    MessageAccepted,
    MessageRejected,
    DecisionIgnored,
    SessionOpened,
    SessionClosed,
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn message() -> Message {
        Message {
            sequence: 9,
            integrity_tag: 0xdead,
            payload: Bytes::from_static(b"zz"),
            source: "9001".to_string(),
            destination: "9002".to_string(),
        }
    }

    #[test]
    fn message_fields_are_omitted_until_attached() {
        let record = DecisionRecord::new(DecisionEvent::ReviewStarted, serde_json::json!({}));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["event"], "review_started");
        assert!(json.get("sequence").is_none());
        assert!(json.get("source").is_none());
    }

    #[test]
    fn with_message_attaches_identity() {
        let record = DecisionRecord::new(DecisionEvent::MessageAccepted, serde_json::json!({}))
            .with_message(&message());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["event"], "message_accepted");
        assert_eq!(json["sequence"], 9);
        assert_eq!(json["integrity_tag"], 0xdead);
        assert_eq!(json["source"], "9001");
        assert_eq!(json["destination"], "9002");
    }
}
