//! Session-level failures and their mapping onto wire error frames.

use lingumate_protocol::{ErrorCode, ErrorFrame, LanguagePair};

use crate::provider::ProviderError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("session {0} already has two participants")]
    SessionFull(String),

    #[error("language pair {declared} does not match session pair {expected}")]
    LanguagePairMismatch {
        expected: LanguagePair,
        declared: LanguagePair,
    },

    #[error("{participant_id} is not a participant of session {session_id}")]
    NotAParticipant {
        session_id: String,
        participant_id: String,
    },

    #[error("session {0} is still waiting for its second participant")]
    SessionNotActive(String),

    #[error("connection is already bound to {participant_id} in session {session_id}")]
    AlreadyInSession {
        session_id: String,
        participant_id: String,
    },

    #[error("translation failed: {0}")]
    TranslationProvider(#[from] ProviderError),

    #[error("translation for session {session_id} could not be delivered to {undelivered}")]
    PartialDelivery {
        session_id: String,
        undelivered: String,
    },

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("{kind} is not served by the {endpoint} endpoint")]
    Unsupported {
        kind: &'static str,
        endpoint: &'static str,
    },
}

impl SessionError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::SessionNotFound(_) => ErrorCode::SessionNotFound,
            Self::SessionFull(_) => ErrorCode::SessionFull,
            Self::LanguagePairMismatch { .. } => ErrorCode::LanguagePairMismatch,
            Self::NotAParticipant { .. } => ErrorCode::NotAParticipant,
            Self::SessionNotActive(_) => ErrorCode::SessionNotActive,
            Self::AlreadyInSession { .. } => ErrorCode::AlreadyInSession,
            Self::TranslationProvider(_) => ErrorCode::TranslationProviderError,
            Self::PartialDelivery { .. } => ErrorCode::PartialDeliveryFailure,
            Self::Malformed(_) => ErrorCode::MalformedMessage,
            Self::Unsupported { .. } => ErrorCode::UnsupportedMessage,
        }
    }

    /// Whether the client may resend the same request unchanged.
    pub fn retryable(&self) -> bool {
        self.error_code().retryable()
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::SessionNotFound(id) | Self::SessionFull(id) | Self::SessionNotActive(id) => {
                Some(id)
            }
            Self::NotAParticipant { session_id, .. }
            | Self::AlreadyInSession { session_id, .. }
            | Self::PartialDelivery { session_id, .. } => Some(session_id),
            _ => None,
        }
    }

    pub fn to_frame(&self) -> ErrorFrame {
        let frame = ErrorFrame::new(self.error_code(), self.to_string());
        match self.session_id() {
            Some(id) => frame.with_session(id),
            None => frame,
        }
    }
}
