//! Shared socket protocol plumbing.
//!
//! Both realtime and presence sockets speak JSON objects tagged by a `type`
//! field. Malformed input never closes a socket; it is answered with an
//! error frame carrying the [`ProtocolError`] message.

use serde::de::DeserializeOwned;
use thiserror::Error;

/// A client frame that could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The frame is not JSON.
    #[error("Invalid JSON format")]
    InvalidJson,
    /// The `type` field is missing or not one this socket handles.
    #[error("Unknown message type")]
    UnknownType,
    /// The type is known but the payload does not fit it.
    #[error("Invalid message: {0}")]
    InvalidPayload(String),
}

/// Parse a `type`-tagged client frame, accepting only `known` types.
pub(crate) fn parse_message<T: DeserializeOwned>(
    text: &str,
    known: &[&str],
) -> Result<T, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|_| ProtocolError::InvalidJson)?;

    let kind = value.get("type").and_then(serde_json::Value::as_str);
    if !kind.is_some_and(|k| known.contains(&k)) {
        return Err(ProtocolError::UnknownType);
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(tag = "type", rename_all = "camelCase")]
    enum Probe {
        Ping,
        Echo { text: String },
    }

    const KNOWN: &[&str] = &["ping", "echo"];

    #[test]
    fn parses_known_types() {
        assert_eq!(
            parse_message::<Probe>(r#"{"type":"ping"}"#, KNOWN),
            Ok(Probe::Ping)
        );
        assert_eq!(
            parse_message::<Probe>(r#"{"type":"echo","text":"hi"}"#, KNOWN),
            Ok(Probe::Echo { text: "hi".into() })
        );
    }

    #[test]
    fn classifies_failures() {
        assert_eq!(
            parse_message::<Probe>("{not json", KNOWN),
            Err(ProtocolError::InvalidJson)
        );
        assert_eq!(
            parse_message::<Probe>(r#"{"type":"dance"}"#, KNOWN),
            Err(ProtocolError::UnknownType)
        );
        assert_eq!(
            parse_message::<Probe>("42", KNOWN),
            Err(ProtocolError::UnknownType)
        );
        assert!(matches!(
            parse_message::<Probe>(r#"{"type":"echo"}"#, KNOWN),
            Err(ProtocolError::InvalidPayload(_))
        ));
    }

    #[test]
    fn messages_match_wire_text() {
        assert_eq!(ProtocolError::InvalidJson.to_string(), "Invalid JSON format");
        assert_eq!(ProtocolError::UnknownType.to_string(), "Unknown message type");
    }
}
