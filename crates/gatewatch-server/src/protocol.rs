//! JSON frames exchanged over the WebSocket.
//!
//! Every frame is a text message holding one object tagged by `"type"`.

use gatewatch_core::{GatewatchError, Result, ScanStatus};
use serde::{Deserialize, Deserializer, Serialize};

/// Frames sent by clients.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Must be the first frame on a connection.
    Hello {
        #[serde(default)]
        token: Option<String>,
    },
    /// A chat message bound for a channel.
    Message {
        #[serde(default, deserialize_with = "optional_id")]
        user_id: Option<String>,
        #[serde(default, deserialize_with = "optional_id")]
        channel_id: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    ScanStatus,
    AddRange {
        range: String,
    },
    StartScan,
    StopScan,
    Ping,
}

/// Frames sent by the server.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        #[serde(skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
    },
    Ack,
    Error {
        reason: String,
    },
    Status {
        status: ScanStatus,
    },
    RangeAdded {
        range: String,
    },
    /// Reply to `start_scan` / `stop_scan`.
    ScanControl {
        scanning: bool,
    },
    Pong,
}

impl ServerMessage {
    pub fn error(reason: impl Into<String>) -> Self {
        ServerMessage::Error {
            reason: reason.into(),
        }
    }
}

pub fn decode(text: &str) -> Result<ClientMessage> {
    serde_json::from_str(text).map_err(|e| GatewatchError::InvalidMessage(e.to_string()))
}

pub fn encode(msg: &ServerMessage) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| GatewatchError::Other(format!("encode failed: {e}")))
}

/// Accept ids sent either as strings or as numbers.
fn optional_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_hello_and_message() {
        assert_eq!(
            decode(r#"{"type":"hello","token":"abc"}"#).unwrap(),
            ClientMessage::Hello {
                token: Some("abc".to_string())
            }
        );
        assert_eq!(
            decode(r#"{"type":"message","user_id":7,"channel_id":"general","message":"hi"}"#)
                .unwrap(),
            ClientMessage::Message {
                user_id: Some("7".to_string()),
                channel_id: Some("general".to_string()),
                message: Some("hi".to_string()),
            }
        );
        assert_eq!(
            decode(r#"{"type":"message","message":"hi"}"#).unwrap(),
            ClientMessage::Message {
                user_id: None,
                channel_id: None,
                message: Some("hi".to_string()),
            }
        );
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(decode(r#"{"type":"delete_server","id":1}"#).is_err());
        assert!(decode("not json").is_err());
    }

    #[test]
    fn test_encode_error() {
        let text = encode(&ServerMessage::error("Rate limit exceeded")).unwrap();
        assert_eq!(text, r#"{"type":"error","reason":"Rate limit exceeded"}"#);
        assert_eq!(encode(&ServerMessage::Ack).unwrap(), r#"{"type":"ack"}"#);
        assert_eq!(
            encode(&ServerMessage::ScanControl { scanning: false }).unwrap(),
            r#"{"type":"scan_control","scanning":false}"#
        );
    }

    #[test]
    fn test_decode_scan_control() {
        assert_eq!(decode(r#"{"type":"start_scan"}"#).unwrap(), ClientMessage::StartScan);
        assert_eq!(decode(r#"{"type":"stop_scan"}"#).unwrap(), ClientMessage::StopScan);
    }
}
