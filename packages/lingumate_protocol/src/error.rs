//! Error codes and the error frame sent back to the triggering connection.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    SessionNotFound,
    SessionFull,
    LanguagePairMismatch,
    NotAParticipant,
    SessionNotActive,
    AlreadyInSession,
    TranslationProviderError,
    PartialDeliveryFailure,
    MalformedMessage,
    UnsupportedMessage,
    IdleTimeout,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionNotFound => "session_not_found",
            Self::SessionFull => "session_full",
            Self::LanguagePairMismatch => "language_pair_mismatch",
            Self::NotAParticipant => "not_a_participant",
            Self::SessionNotActive => "session_not_active",
            Self::AlreadyInSession => "already_in_session",
            Self::TranslationProviderError => "translation_provider_error",
            Self::PartialDeliveryFailure => "partial_delivery_failure",
            Self::MalformedMessage => "malformed_message",
            Self::UnsupportedMessage => "unsupported_message",
            Self::IdleTimeout => "idle_timeout",
        }
    }

    /// Transient failures the client may retry as-is.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::TranslationProviderError | Self::PartialDeliveryFailure
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a `{"type":"error", ...}` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorFrame {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ErrorFrame {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.retryable(),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}
