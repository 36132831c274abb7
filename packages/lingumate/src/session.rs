//! Session records and the session state machine.
//!
//! Sessions and participants are owned exclusively by the
//! [`SessionRegistry`](crate::registry::SessionRegistry). Connections only keep
//! the session id as a lookup key.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use lingumate_protocol::{
    LanguagePair, LanguageTag, ParticipantInfo, ServerMessage, SessionState, TranslationResult,
};
use tokio::time::Instant;

use crate::ws::ConnectionHandle;

/// A session never holds more than this many participants.
pub const MAX_PARTICIPANTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTransition {
    /// initiating → paired (second participant bound)
    Pair,
    /// paired → active (entered immediately after pairing)
    Activate,
    /// any non-closed → closed
    Close,
}

impl fmt::Display for SessionTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pair => write!(f, "pair"),
            Self::Activate => write!(f, "activate"),
            Self::Close => write!(f, "close"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {transition} a session that is {from}")]
    InvalidTransition {
        from: SessionState,
        transition: SessionTransition,
    },
    #[error("closed is a terminal state")]
    TerminalState,
}

impl SessionTransition {
    pub fn apply(self, from: SessionState) -> Result<SessionState, TransitionError> {
        use SessionState::*;
        use SessionTransition::*;

        if from == Closed {
            return Err(TransitionError::TerminalState);
        }

        match (from, self) {
            (Initiating, Pair) => Ok(Paired),
            (Paired, Activate) => Ok(Active),
            (_, Close) => Ok(Closed),
            (from, transition) => Err(TransitionError::InvalidTransition { from, transition }),
        }
    }
}

/// One connected user within a session.
#[derive(Debug, Clone)]
pub struct Participant {
    pub info: ParticipantInfo,
    /// The live socket currently representing this participant. Rebound when
    /// the participant reattaches from another connection.
    pub connection: ConnectionHandle,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(info: ParticipantInfo, connection: ConnectionHandle) -> Self {
        Self {
            info,
            connection,
            joined_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }
}

#[derive(Debug)]
pub struct Session {
    pub id: String,
    participants: Vec<Participant>,
    pub language_pair: LanguagePair,
    state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    last_activity: Instant,
}

impl Session {
    pub fn new(id: String, initiator: Participant, language_pair: LanguagePair) -> Self {
        let now = Utc::now();
        Self {
            id,
            participants: vec![initiator],
            language_pair,
            state: SessionState::Initiating,
            created_at: now,
            last_activity_at: now,
            last_activity: Instant::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, participant_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id() == participant_id)
    }

    pub fn participant_mut(&mut self, participant_id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id() == participant_id)
    }

    pub fn peer_of(&self, participant_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id() != participant_id)
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= MAX_PARTICIPANTS
    }

    /// Seat a second participant and move through `paired` into `active`.
    /// The caller must hold the registry lock across the fullness check and
    /// this call.
    pub fn seat(&mut self, participant: Participant) -> Result<(), TransitionError> {
        let paired = SessionTransition::Pair.apply(self.state)?;
        let active = SessionTransition::Activate.apply(paired)?;
        self.participants.push(participant);
        self.state = active;
        self.touch();
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), TransitionError> {
        self.state = SessionTransition::Close.apply(self.state)?;
        Ok(())
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
        self.last_activity_at = Utc::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            state: self.state,
            language_pair: self.language_pair.clone(),
            participants: self.participants.iter().map(|p| p.info.clone()).collect(),
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
        }
    }
}

/// Read-only copy of a session handed out by registry lookups.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub state: SessionState,
    pub language_pair: LanguagePair,
    pub participants: Vec<ParticipantInfo>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// One relayed utterance. Lives until it has been delivered (and optionally
/// written to the audit log).
#[derive(Debug, Clone)]
pub struct TranslationMessage {
    pub sender_id: String,
    pub session_id: String,
    pub original_text: String,
    pub source_language: LanguageTag,
    pub target_language: LanguageTag,
    pub translated_text: String,
    pub timestamp: DateTime<Utc>,
}

impl TranslationMessage {
    pub fn to_frame(&self) -> ServerMessage {
        ServerMessage::TranslationResult {
            message: TranslationResult {
                original_text: self.original_text.clone(),
                translated_text: self.translated_text.clone(),
                sender_id: self.sender_id.clone(),
                session_id: self.session_id.clone(),
                source_language: self.source_language.clone(),
                target_language: self.target_language.clone(),
                timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            },
        }
    }
}
