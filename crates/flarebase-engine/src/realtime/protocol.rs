//! Realtime socket frames.

use flarebase_core::SessionId;
use serde::{Deserialize, Serialize};

use crate::events::RealtimeEvent;
use crate::protocol::{parse_message, ProtocolError};

/// Frames a realtime client may send.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Start receiving events for a collection.
    Subscribe {
        /// Collection name.
        collection: String,
    },
    /// Stop receiving events for a collection.
    Unsubscribe {
        /// Collection name.
        collection: String,
    },
    /// Keep-alive.
    Ping,
}

impl ClientMessage {
    const TYPES: &'static [&'static str] = &["subscribe", "unsubscribe", "ping"];

    /// Parse a text frame.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] describing what is wrong with the frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        parse_message(text, Self::TYPES)
    }
}

/// Frames the server sends on a realtime socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Welcome frame.
    Connected {
        /// The new session's ID.
        session_id: SessionId,
        /// Server time.
        timestamp: String,
    },
    /// Subscription acknowledged.
    Subscribed {
        /// Collection name.
        collection: String,
        /// Server time.
        timestamp: String,
    },
    /// Unsubscription acknowledged.
    Unsubscribed {
        /// Collection name.
        collection: String,
        /// Server time.
        timestamp: String,
    },
    /// Reply to `ping`.
    Pong {
        /// Server time.
        timestamp: String,
    },
    /// The last client frame was rejected.
    Error {
        /// What went wrong.
        message: String,
    },
    /// A record change in a subscribed collection.
    Event(RealtimeEvent),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_client_frames() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"subscribe","collection":"posts"}"#),
            Ok(ClientMessage::Subscribe {
                collection: "posts".into()
            })
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"ping"}"#),
            Ok(ClientMessage::Ping)
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"getUsers"}"#),
            Err(ProtocolError::UnknownType)
        );
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"subscribe"}"#),
            Err(ProtocolError::InvalidPayload(_))
        ));
    }

    #[test]
    fn server_frames_wire_format() {
        let session_id = SessionId::generate();
        let connected = ServerMessage::Connected {
            session_id,
            timestamp: "t".into(),
        };
        assert_eq!(
            serde_json::to_value(&connected).unwrap(),
            json!({"type": "connected", "sessionId": session_id.to_string(), "timestamp": "t"})
        );

        let error = ServerMessage::Error {
            message: "Unknown message type".into(),
        };
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"type": "error", "message": "Unknown message type"})
        );
    }

    #[test]
    fn event_frame_flattens_event() {
        let frame = ServerMessage::Event(RealtimeEvent::deleted("posts", "r1"));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["action"], "delete");
        assert_eq!(json["collection"], "posts");
        assert_eq!(json["id"], "r1");
    }
}
