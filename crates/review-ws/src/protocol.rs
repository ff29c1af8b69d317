use serde::{Deserialize, Serialize};

use relay_core::Message;

/// Numeric message kinds on the review socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Kind {
    /// Sent by the server when a session is registered.
    Hello = 1,
    /// Client-initiated request, e.g. a pending-ledger replay.
    Request = 2,
    /// A decision on a specific pending message.
    Response = 3,
    Broadcast = 4,
}

impl From<Kind> for u8 {
    fn from(kind: Kind) -> Self {
        kind as u8
    }
}

impl TryFrom<u8> for Kind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Kind::Hello),
            2 => Ok(Kind::Request),
            3 => Ok(Kind::Response),
            4 => Ok(Kind::Broadcast),
            other => Err(format!("unknown message kind {other}")),
        }
    }
}

/// A JSON message received from a reviewer session.
///
/// Fields other than `kind` are optional; which ones matter depends on the
/// kind (`request` for kind 2, `msgNumber` and `data` for kind 3).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    pub kind: Kind,
    #[serde(default, rename = "msgNumber")]
    pub msg_number: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub request: String,
}

/// A JSON message sent to a reviewer session.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Hello { kind: Kind },
    Pending(PendingEntry),
}

impl ServerMessage {
    pub fn hello() -> Self {
        ServerMessage::Hello { kind: Kind::Hello }
    }
}

/// One pending message as shown to reviewers.  The sequence number travels
/// as a decimal string and the payload as lossy UTF-8 text.
#[derive(Debug, Clone, Serialize)]
pub struct PendingEntry {
    pub src: String,
    pub dst: String,
    #[serde(rename = "msgNumber")]
    pub msg_number: String,
    pub payload: String,
}

impl PendingEntry {
    pub fn from_message(message: &Message) -> Self {
        Self {
            src: message.source.clone(),
            dst: message.destination.clone(),
            msg_number: message.sequence.to_string(),
            payload: String::from_utf8_lossy(&message.payload).into_owned(),
        }
    }
}
