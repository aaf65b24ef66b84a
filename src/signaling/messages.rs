//! Message Types für das Call-Signaling
//!
//! Diese Strukturen beschreiben die JSON-Payloads, die zwischen zwei
//! Call-Sessions ausgetauscht werden. Der Transport (wie die Bytes beim
//! Peer ankommen) gehört nicht zu diesem Crate.

use crate::transport::IceCandidate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("Invalid UTF-8 payload: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Malformed call message: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// CALL MESSAGES
// ============================================================================

/// Typ-spezifischer Inhalt einer Call-Nachricht
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CallPayload {
    /// SDP Offer
    Offer { sdp: String },

    /// SDP Answer
    Answer { sdp: String },

    /// Lokal gesammelter ICE Candidate
    Candidate { candidate: IceCandidate },

    /// Anruf-Einladung mit Ablaufzeit (Unix-Millisekunden)
    Request { exp: i64 },

    /// Einladung abgelehnt
    Reject,

    /// Anruf beendet
    End,
}

impl CallPayload {
    /// Name des Nachrichtentyps wie auf dem Wire
    pub fn kind(&self) -> &'static str {
        match self {
            CallPayload::Offer { .. } => "offer",
            CallPayload::Answer { .. } => "answer",
            CallPayload::Candidate { .. } => "candidate",
            CallPayload::Request { .. } => "request",
            CallPayload::Reject => "reject",
            CallPayload::End => "end",
        }
    }
}

/// Signaling-Nachricht zwischen zwei Call-Sessions
///
/// Auf dem Wire: `{"type": ..., "from": ..., "sessionId": ..., ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMessage {
    pub from: String,
    #[serde(rename = "sessionId")]
    pub session_id: u32,
    #[serde(flatten)]
    pub payload: CallPayload,
}

impl CallMessage {
    pub fn new(from: impl Into<String>, session_id: u32, payload: CallPayload) -> Self {
        Self {
            from: from.into(),
            session_id,
            payload,
        }
    }

    /// Parst eine Nachricht aus UTF-8 JSON
    pub fn from_bytes(data: &[u8]) -> Result<Self, MessageError> {
        let text = std::str::from_utf8(data)?;
        Ok(serde_json::from_str(text)?)
    }

    /// Kodiert die Nachricht als UTF-8 JSON
    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
        Ok(serde_json::to_vec(self)?)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_wire_shape() {
        let msg = CallMessage::new(
            "alice",
            4242,
            CallPayload::Offer {
                sdp: "v=0".to_string(),
            },
        );

        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "offer",
                "from": "alice",
                "sessionId": 4242,
                "sdp": "v=0"
            })
        );
    }

    #[test]
    fn test_parse_candidate_from_browser_json() {
        let raw = br#"{
            "type": "candidate",
            "from": "bob",
            "sessionId": 7,
            "candidate": {
                "candidate": "candidate:1 1 udp 2130706431 10.0.0.2 50000 typ host",
                "sdpMid": "0",
                "sdpMLineIndex": 0,
                "usernameFragment": "abcd"
            }
        }"#;

        let msg = CallMessage::from_bytes(raw).unwrap();
        assert_eq!(msg.from, "bob");
        assert_eq!(msg.session_id, 7);
        match msg.payload {
            CallPayload::Candidate { candidate } => {
                assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
                assert_eq!(candidate.sdp_mline_index, Some(0));
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_unit_variants_carry_only_header() {
        let msg = CallMessage::new("alice", 1, CallPayload::End);
        let value: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"type": "end", "from": "alice", "sessionId": 1})
        );

        let parsed = CallMessage::from_bytes(br#"{"type":"reject","from":"bob","sessionId":1}"#)
            .unwrap();
        assert_eq!(parsed.payload, CallPayload::Reject);
    }

    #[test]
    fn test_malformed_payloads_are_errors() {
        assert!(CallMessage::from_bytes(b"not json").is_err());
        assert!(CallMessage::from_bytes(&[0xff, 0xfe]).is_err());
        assert!(
            CallMessage::from_bytes(br#"{"type":"dance","from":"bob","sessionId":1}"#).is_err()
        );
        assert!(CallMessage::from_bytes(br#"{"type":"offer","from":"bob"}"#).is_err());
    }

    #[test]
    fn test_request_carries_expiry() {
        let msg = CallMessage::from_bytes(
            br#"{"type":"request","from":"bob","sessionId":3,"exp":1700000060000}"#,
        )
        .unwrap();
        assert_eq!(msg.payload, CallPayload::Request { exp: 1700000060000 });
        assert_eq!(msg.payload.kind(), "request");
    }
}
