//! Wire message definitions.
//!
//! Every datagram carries exactly one [`Message`] as a JSON object. The
//! discriminant lives in `type`, the sender's peer id in `userid`:
//!
//! ```text
//! {"type":"discover","userid":"alice"}
//! {"type":"sync","userid":"server"}
//! {"type":"followup","userid":"server","master_sync_time":5000}
//! {"type":"delay_req","userid":"alice"}
//! {"type":"delay_reply","userid":"server","req_time":5050}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{DecodeError, TransportError};

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Initiator announces itself and asks for a sync.
    #[serde(rename = "discover")]
    Discover {
        /// Sender's peer id.
        #[serde(rename = "userid")]
        peer_id: String,
    },

    /// Responder marks the instant its sync time was recorded.
    #[serde(rename = "sync")]
    Sync {
        /// Sender's peer id.
        #[serde(rename = "userid")]
        peer_id: String,
    },

    /// Responder reports the clock reading taken when it sent the sync.
    #[serde(rename = "followup")]
    FollowUp {
        /// Sender's peer id.
        #[serde(rename = "userid")]
        peer_id: String,
        /// Responder clock when the sync was sent.
        master_sync_time: i64,
    },

    /// Initiator asks the responder to timestamp this message's arrival.
    #[serde(rename = "delay_req")]
    DelayRequest {
        /// Sender's peer id.
        #[serde(rename = "userid")]
        peer_id: String,
    },

    /// Responder reports when it received the delay request.
    #[serde(rename = "delay_reply")]
    DelayReply {
        /// Sender's peer id.
        #[serde(rename = "userid")]
        peer_id: String,
        /// Responder clock when the delay request was handled.
        req_time: i64,
    },

    /// Any well-formed message with a `type` this implementation does not know.
    ///
    /// Never sent; roles ignore it on receipt.
    #[serde(other)]
    Unknown,
}

impl Message {
    /// Create a discover message.
    pub fn discover(peer_id: impl Into<String>) -> Self {
        Self::Discover {
            peer_id: peer_id.into(),
        }
    }

    /// Create a sync message.
    pub fn sync(peer_id: impl Into<String>) -> Self {
        Self::Sync {
            peer_id: peer_id.into(),
        }
    }

    /// Create a follow-up message.
    pub fn follow_up(peer_id: impl Into<String>, master_sync_time: i64) -> Self {
        Self::FollowUp {
            peer_id: peer_id.into(),
            master_sync_time,
        }
    }

    /// Create a delay request message.
    pub fn delay_request(peer_id: impl Into<String>) -> Self {
        Self::DelayRequest {
            peer_id: peer_id.into(),
        }
    }

    /// Create a delay reply message.
    pub fn delay_reply(peer_id: impl Into<String>, req_time: i64) -> Self {
        Self::DelayReply {
            peer_id: peer_id.into(),
            req_time,
        }
    }

    /// Get the sender's peer id, if the message kind carries one.
    pub fn peer_id(&self) -> Option<&str> {
        match self {
            Self::Discover { peer_id }
            | Self::Sync { peer_id }
            | Self::FollowUp { peer_id, .. }
            | Self::DelayRequest { peer_id }
            | Self::DelayReply { peer_id, .. } => Some(peer_id),
            Self::Unknown => None,
        }
    }

    /// Get the wire name of this message kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Discover { .. } => "discover",
            Self::Sync { .. } => "sync",
            Self::FollowUp { .. } => "followup",
            Self::DelayRequest { .. } => "delay_req",
            Self::DelayReply { .. } => "delay_reply",
            Self::Unknown => "unknown",
        }
    }

    /// Serialize for wire transmission.
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        serde_json::to_vec(self).map_err(|e| TransportError::Encode(e.to_string()))
    }

    /// Deserialize from a received datagram.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.is_empty() {
            return Err(DecodeError::Empty);
        }
        let text = std::str::from_utf8(data).map_err(|_| DecodeError::NotUtf8)?;
        serde_json::from_str(text).map_err(|e| DecodeError::InvalidMessage(e.to_string()))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Discover { .. } => "DISCOVER",
            Self::Sync { .. } => "SYNC",
            Self::FollowUp { .. } => "FOLLOW_UP",
            Self::DelayRequest { .. } => "DELAY_REQ",
            Self::DelayReply { .. } => "DELAY_RESP",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_on_the_wire() {
        let bytes = Message::follow_up("server", 5000).encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["type"], "followup");
        assert_eq!(value["userid"], "server");
        assert_eq!(value["master_sync_time"], 5000);

        let bytes = Message::delay_reply("server", 5050).encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "delay_reply");
        assert_eq!(value["req_time"], 5050);
    }

    #[test]
    fn test_decode_reference_payloads() {
        let msg = Message::decode(br#"{"type":"discover","userid":"alice"}"#).unwrap();
        assert_eq!(msg, Message::discover("alice"));

        let msg = Message::decode(br#"{"userid":"alice","type":"delay_req"}"#).unwrap();
        assert_eq!(msg, Message::delay_request("alice"));
        assert_eq!(msg.peer_id(), Some("alice"));
        assert_eq!(msg.kind(), "delay_req");
    }

    #[test]
    fn test_unknown_kind_is_not_an_error() {
        let msg = Message::decode(br#"{"type":"announce","userid":"x","extra":1}"#).unwrap();
        assert_eq!(msg, Message::Unknown);
        assert_eq!(msg.peer_id(), None);
    }

    #[test]
    fn test_decode_failures() {
        assert_eq!(Message::decode(b""), Err(DecodeError::Empty));
        assert_eq!(Message::decode(&[0xff, 0xfe]), Err(DecodeError::NotUtf8));
        assert!(matches!(
            Message::decode(b"not json"),
            Err(DecodeError::InvalidMessage(_))
        ));
        // Known kind with a missing field.
        assert!(matches!(
            Message::decode(br#"{"type":"followup","userid":"server"}"#),
            Err(DecodeError::InvalidMessage(_))
        ));
        // Missing discriminant.
        assert!(matches!(
            Message::decode(br#"{"userid":"alice"}"#),
            Err(DecodeError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_display_labels() {
        assert_eq!(Message::discover("a").to_string(), "DISCOVER");
        assert_eq!(Message::delay_reply("s", 1).to_string(), "DELAY_RESP");
    }
}
