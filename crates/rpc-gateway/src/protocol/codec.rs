//! Frame encode/decode
//!
//! The one place that turns `GatewayMessage`s into text frames and back.

use serde::Deserialize;
use serde_json::Value;

use super::{GatewayMessage, OpCode};
use crate::error::GatewayError;

/// Frame shape before the op code is validated
#[derive(Deserialize)]
struct RawFrame {
    op: u8,
    #[serde(default)]
    d: Option<Value>,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

/// Encode a message as a JSON text frame
pub fn encode(message: &GatewayMessage) -> Result<String, GatewayError> {
    serde_json::to_string(message)
        .map_err(|e| GatewayError::Protocol(format!("failed to encode {}: {e}", message.op)))
}

/// Decode a JSON text frame
///
/// Returns `Ok(None)` for well-formed frames with an op code this client
/// does not handle.
pub fn decode(text: &str) -> Result<Option<GatewayMessage>, GatewayError> {
    let raw: RawFrame = serde_json::from_str(text)
        .map_err(|e| GatewayError::Protocol(format!("malformed frame: {e}")))?;

    let Some(op) = OpCode::from_u8(raw.op) else {
        tracing::debug!(op = raw.op, "Ignoring frame with unhandled op code");
        return Ok(None);
    };

    Ok(Some(GatewayMessage {
        op,
        d: raw.d,
        s: raw.s,
        t: raw.t,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_dispatch() {
        let msg = decode(r#"{"op":0,"s":12,"t":"READY","d":{"session_id":"x"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(msg.op, OpCode::Dispatch);
        assert_eq!(msg.s, Some(12));
        assert_eq!(msg.t.as_deref(), Some("READY"));
    }

    #[test]
    fn test_decode_null_fields() {
        let msg = decode(r#"{"op":11,"d":null,"s":null,"t":null}"#).unwrap().unwrap();
        assert_eq!(msg, GatewayMessage::heartbeat_ack());
    }

    #[test]
    fn test_decode_unknown_op_is_skipped() {
        assert!(decode(r#"{"op":41,"d":{}}"#).unwrap().is_none());
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode("not json"), Err(GatewayError::Protocol(_))));
        assert!(matches!(decode(r#"{"d":1}"#), Err(GatewayError::Protocol(_))));
    }

    #[test]
    fn test_encode_heartbeat() {
        let text = encode(&GatewayMessage::heartbeat(Some(3))).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["op"], 1);
        assert_eq!(value["d"], 3);
    }
}
