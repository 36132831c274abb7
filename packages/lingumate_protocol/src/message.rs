//! Message types for client-server communication over the handshake and relay sockets.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorFrame;
use crate::language::LanguageTag;

/// A participant as declared by the client in its init frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub id: String,
    pub name: String,
    pub preferred_language: LanguageTag,
}

/// Lifecycle state of a session. Transitions only move forward:
/// `initiating -> paired -> active -> closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Initiating,
    Paired,
    Active,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initiating => write!(f, "initiating"),
            Self::Paired => write!(f, "paired"),
            Self::Active => write!(f, "active"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Why a `session_closed` notice was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosureReason {
    PeerDisconnected,
    ClosedByParticipant,
    IdleTimeout,
    ServerShutdown,
    /// The participant reattached on another connection. Only this
    /// connection is closed; the session carries on.
    Superseded,
}

impl ClosureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PeerDisconnected => "peer_disconnected",
            Self::ClosedByParticipant => "closed_by_participant",
            Self::IdleTimeout => "idle_timeout",
            Self::ServerShutdown => "server_shutdown",
            Self::Superseded => "superseded",
        }
    }
}

impl fmt::Display for ClosureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Messages sent FROM the client TO the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Create a session, or join/reattach to the one named by `session_id`.
    InitTranslationSession {
        user: ParticipantInfo,
        user1_language: LanguageTag,
        user2_language: LanguageTag,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    /// Translate `text` and relay the result to both participants.
    TextTranslation {
        text: String,
        source_language: LanguageTag,
        target_language: LanguageTag,
        sender_id: String,
        session_id: String,
    },
    /// Close the session on behalf of one of its participants.
    CloseSession { session_id: String, sender_id: String },
}

impl ClientMessage {
    pub const KINDS: [&'static str; 3] = [
        "init_translation_session",
        "text_translation",
        "close_session",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            Self::InitTranslationSession { .. } => "init_translation_session",
            Self::TextTranslation { .. } => "text_translation",
            Self::CloseSession { .. } => "close_session",
        }
    }
}

/// One relayed utterance, as delivered to both participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResult {
    pub original_text: String,
    pub translated_text: String,
    pub sender_id: String,
    pub session_id: String,
    pub source_language: LanguageTag,
    pub target_language: LanguageTag,
    /// RFC 3339, UTC
    pub timestamp: String,
}

/// Messages sent FROM the server TO the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// The session exists; clients keep `session_id` for later frames.
    TranslationSessionCreated {
        session_id: String,
        state: SessionState,
    },
    /// Sent to the initiator once the second participant pairs.
    ParticipantJoined {
        session_id: String,
        participant: ParticipantInfo,
    },
    TranslationResult { message: TranslationResult },
    /// Closure notice. Nothing else is sent on the socket after this.
    SessionClosed {
        session_id: String,
        reason: ClosureReason,
    },
    Error(ErrorFrame),
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TranslationSessionCreated { .. } => "translation_session_created",
            Self::ParticipantJoined { .. } => "participant_joined",
            Self::TranslationResult { .. } => "translation_result",
            Self::SessionClosed { .. } => "session_closed",
            Self::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("frame has no string `type` field")]
    MissingType,
    #[error("unknown message type {0:?}")]
    UnknownType(String),
    #[error("invalid {kind} frame: {reason}")]
    InvalidFields { kind: String, reason: String },
}

/// Decode one inbound text frame. Distinguishes broken JSON, unknown kinds
/// and schema violations so the error frame can say which one it was.
pub fn decode_client_message(text: &str) -> Result<ClientMessage, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    let kind = match value.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        _ => return Err(DecodeError::MissingType),
    };

    if !ClientMessage::KINDS.contains(&kind.as_str()) {
        return Err(DecodeError::UnknownType(kind));
    }

    serde_json::from_value(value).map_err(|e| DecodeError::InvalidFields {
        kind,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn decodes_init_from_reference_client() {
        let text = r#"{"type":"init_translation_session","user":{"id":"u1","name":"Alice","preferredLanguage":"en"},"user1Language":"en","user2Language":"es"}"#;
        match decode_client_message(text).unwrap() {
            ClientMessage::InitTranslationSession {
                user,
                user1_language,
                user2_language,
                session_id,
            } => {
                assert_eq!(user.id, "u1");
                assert_eq!(user.name, "Alice");
                assert_eq!(user.preferred_language.as_str(), "en");
                assert_eq!(user1_language.as_str(), "en");
                assert_eq!(user2_language.as_str(), "es");
                assert!(session_id.is_none());
            }
            other => panic!("Expected InitTranslationSession, got {other:?}"),
        }
    }

    #[test]
    fn decodes_text_translation() {
        let text = r#"{"type":"text_translation","text":"Hello, how are you?","sourceLanguage":"en","targetLanguage":"es","senderId":"u1","sessionId":"sess_abc123"}"#;
        let msg = decode_client_message(text).unwrap();
        assert_eq!(msg.kind(), "text_translation");
        match msg {
            ClientMessage::TextTranslation {
                text,
                sender_id,
                session_id,
                ..
            } => {
                assert_eq!(text, "Hello, how are you?");
                assert_eq!(sender_id, "u1");
                assert_eq!(session_id, "sess_abc123");
            }
            other => panic!("Expected TextTranslation, got {other:?}"),
        }
    }

    #[test]
    fn decode_errors_are_classified() {
        assert!(matches!(
            decode_client_message("{not json"),
            Err(DecodeError::InvalidJson(_))
        ));
        assert_eq!(
            decode_client_message(r#"{"text":"hi"}"#),
            Err(DecodeError::MissingType)
        );
        assert_eq!(
            decode_client_message(r#"[1,2]"#),
            Err(DecodeError::MissingType)
        );
        assert_eq!(
            decode_client_message(r#"{"type":"audio_chunk"}"#),
            Err(DecodeError::UnknownType("audio_chunk".into()))
        );
        match decode_client_message(r#"{"type":"text_translation","text":"hi"}"#) {
            Err(DecodeError::InvalidFields { kind, .. }) => assert_eq!(kind, "text_translation"),
            other => panic!("Expected InvalidFields, got {other:?}"),
        }
        // A bad language tag is a schema violation too
        assert!(matches!(
            decode_client_message(
                r#"{"type":"close_session","sessionId":"s","senderId":"u"}"#
            ),
            Ok(ClientMessage::CloseSession { .. })
        ));
        assert!(matches!(
            decode_client_message(
                r#"{"type":"text_translation","text":"hi","sourceLanguage":"","targetLanguage":"es","senderId":"u","sessionId":"s"}"#
            ),
            Err(DecodeError::InvalidFields { .. })
        ));
    }

    #[test]
    fn session_created_matches_wire_shape() {
        let msg = ServerMessage::TranslationSessionCreated {
            session_id: "sess_abc123".into(),
            state: SessionState::Initiating,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "translation_session_created");
        assert_eq!(value["sessionId"], "sess_abc123");
        assert_eq!(value["state"], "initiating");
    }

    #[test]
    fn translation_result_matches_wire_shape() {
        let msg = ServerMessage::TranslationResult {
            message: TranslationResult {
                original_text: "Hello, how are you?".into(),
                translated_text: "Hola, ¿cómo estás?".into(),
                sender_id: "u1".into(),
                session_id: "sess_abc123".into(),
                source_language: LanguageTag::parse("en").unwrap(),
                target_language: LanguageTag::parse("es").unwrap(),
                timestamp: "2026-01-01T00:00:00Z".into(),
            },
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "translation_result");
        assert_eq!(value["message"]["originalText"], "Hello, how are you?");
        assert_eq!(value["message"]["translatedText"], "Hola, ¿cómo estás?");
        assert_eq!(value["message"]["senderId"], "u1");
        assert_eq!(value["message"]["sessionId"], "sess_abc123");

        let back: ServerMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn error_frame_is_flattened_under_type_error() {
        let msg = ServerMessage::Error(ErrorFrame::new(ErrorCode::SessionFull, "full"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "session_full");
        assert_eq!(value["message"], "full");
        assert_eq!(msg.kind(), "error");
    }

    #[test]
    fn closure_notice_carries_reason() {
        let msg = ServerMessage::SessionClosed {
            session_id: "s1".into(),
            reason: ClosureReason::IdleTimeout,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "session_closed");
        assert_eq!(value["reason"], "idle_timeout");
    }

    #[test]
    fn superseded_notice_is_snake_case() {
        let msg = ServerMessage::SessionClosed {
            session_id: "sess_abc123".into(),
            reason: ClosureReason::Superseded,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["reason"], "superseded");
    }
}
