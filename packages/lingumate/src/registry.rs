//! Session Registry
//!
//! The single shared resource: every session and participant lives here, and
//! every mutation happens under one write lock. The lock is only held for the
//! map lookup/update itself, never across provider calls or socket writes;
//! connection handles are signalled after it has been released.

use std::collections::HashMap;
use std::time::Duration;

use lingumate_protocol::{ClosureReason, LanguagePair, ParticipantInfo, ServerMessage};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::session::{Participant, Session, SessionSnapshot};
use crate::ws::ConnectionHandle;

/// Result of a successful `join`.
#[derive(Debug)]
pub enum JoinOutcome {
    /// Seated as the second participant; the session is now active.
    Joined {
        snapshot: SessionSnapshot,
        /// Handle of the participant who was already waiting
        initiator: ConnectionHandle,
    },
    /// The participant was already seated and now answers on a new connection.
    Reattached {
        snapshot: SessionSnapshot,
        previous: ConnectionHandle,
    },
}

/// Everything the relay needs to fan a result out, copied out of the lock.
#[derive(Debug, Clone)]
pub struct RelayTargets {
    pub session_id: String,
    pub language_pair: LanguagePair,
    /// (participant id, current connection)
    pub recipients: Vec<(String, ConnectionHandle)>,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session in `initiating` holding its first participant.
    pub async fn create_session(
        &self,
        initiator: ParticipantInfo,
        language_pair: LanguagePair,
        connection: ConnectionHandle,
    ) -> SessionSnapshot {
        let mut sessions = self.sessions.write().await;
        let session_id = loop {
            let candidate = format!("sess_{}", uuid::Uuid::new_v4().simple());
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        let participant = Participant::new(initiator, connection);
        let session = Session::new(session_id.clone(), participant, language_pair);
        let snapshot = session.snapshot();
        sessions.insert(session_id, session);

        info!(
            session_id = %snapshot.session_id,
            pair = %snapshot.language_pair,
            "Session created"
        );
        snapshot
    }

    /// Seat `participant` in an existing session, or rebind their connection
    /// if they are already seated. The fullness check and the seat happen
    /// under the same write lock, so concurrent joiners can never both win.
    pub async fn join(
        &self,
        session_id: &str,
        participant: ParticipantInfo,
        declared: &LanguagePair,
        connection: ConnectionHandle,
    ) -> Result<JoinOutcome, SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))?;

        // A reattaching participant must still declare the session's pair
        if session.participant(&participant.id).is_some()
            && !session.language_pair.is_compatible_with(declared)
        {
            return Err(SessionError::LanguagePairMismatch {
                expected: session.language_pair.clone(),
                declared: declared.clone(),
            });
        }

        if let Some(seated) = session.participant_mut(&participant.id) {
            let previous = std::mem::replace(&mut seated.connection, connection);
            seated.info = participant;
            session.touch();
            debug!(
                session_id,
                previous_conn = %previous.id(),
                "Participant reattached"
            );
            return Ok(JoinOutcome::Reattached {
                snapshot: session.snapshot(),
                previous,
            });
        }

        if session.is_full() {
            return Err(SessionError::SessionFull(session_id.to_string()));
        }

        if !session.language_pair.is_compatible_with(declared) {
            return Err(SessionError::LanguagePairMismatch {
                expected: session.language_pair.clone(),
                declared: declared.clone(),
            });
        }

        let joiner_id = participant.id.clone();
        if let Err(e) = session.seat(Participant::new(participant, connection)) {
            warn!(session_id, error = %e, "Refusing to seat participant");
            return Err(SessionError::SessionFull(session_id.to_string()));
        }

        let initiator = session
            .peer_of(&joiner_id)
            .map(|p| p.connection.clone())
            .ok_or_else(|| SessionError::SessionFull(session_id.to_string()))?;

        info!(session_id, participant_id = %joiner_id, "Session paired");
        Ok(JoinOutcome::Joined {
            snapshot: session.snapshot(),
            initiator,
        })
    }

    pub async fn lookup(&self, session_id: &str) -> Result<SessionSnapshot, SessionError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(Session::snapshot)
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))
    }

    /// Refresh idle tracking. Returns false if the session is gone.
    pub async fn touch(&self, session_id: &str) -> bool {
        match self.sessions.write().await.get_mut(session_id) {
            Some(session) => {
                session.touch();
                true
            }
            None => false,
        }
    }

    pub async fn is_active(&self, session_id: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(session_id)
            .is_some_and(|s| s.state() == lingumate_protocol::SessionState::Active)
    }

    /// Resolve the recipients of a relayed message sent by `sender_id`.
    pub async fn relay_targets(
        &self,
        session_id: &str,
        sender_id: &str,
    ) -> Result<RelayTargets, SessionError> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))?;

        if session.participant(sender_id).is_none() {
            return Err(SessionError::NotAParticipant {
                session_id: session_id.to_string(),
                participant_id: sender_id.to_string(),
            });
        }
        if session.state() != lingumate_protocol::SessionState::Active {
            return Err(SessionError::SessionNotActive(session_id.to_string()));
        }

        Ok(RelayTargets {
            session_id: session.id.clone(),
            language_pair: session.language_pair.clone(),
            recipients: session
                .participants()
                .iter()
                .map(|p| (p.id().to_string(), p.connection.clone()))
                .collect(),
        })
    }

    /// Remove the session and send both handles a closure notice.
    pub async fn close(&self, session_id: &str, reason: ClosureReason) -> Option<SessionSnapshot> {
        let session = self.sessions.write().await.remove(session_id)?;
        Some(Self::finish(session, reason))
    }

    /// Close on behalf of a participant. Anyone else gets `NotAParticipant`.
    pub async fn close_by(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> Result<SessionSnapshot, SessionError> {
        let session = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get(session_id)
                .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))?;
            if session.participant(participant_id).is_none() {
                return Err(SessionError::NotAParticipant {
                    session_id: session_id.to_string(),
                    participant_id: participant_id.to_string(),
                });
            }
            sessions
                .remove(session_id)
                .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))?
        };
        Ok(Self::finish(session, ClosureReason::ClosedByParticipant))
    }

    /// A connection went away. The session closes only if `conn_id` is still
    /// the participant's current connection; a superseded connection closing
    /// is a no-op.
    pub async fn connection_lost(
        &self,
        session_id: &str,
        participant_id: &str,
        conn_id: &str,
    ) -> Option<SessionSnapshot> {
        let session = {
            let mut sessions = self.sessions.write().await;
            let current = sessions
                .get(session_id)?
                .participant(participant_id)
                .is_some_and(|p| p.connection.id() == conn_id);
            if !current {
                debug!(session_id, conn_id, "Stale connection closed, session kept");
                return None;
            }
            sessions.remove(session_id)?
        };
        Some(Self::finish(session, ClosureReason::PeerDisconnected))
    }

    /// Close every session idle for at least `threshold`.
    pub async fn reap_idle(&self, threshold: Duration) -> Vec<SessionSnapshot> {
        let expired: Vec<Session> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<String> = sessions
                .values()
                .filter(|s| s.idle_for() >= threshold)
                .map(|s| s.id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };
        expired
            .into_iter()
            .map(|s| Self::finish(s, ClosureReason::IdleTimeout))
            .collect()
    }

    pub async fn close_all(&self, reason: ClosureReason) -> Vec<SessionSnapshot> {
        let drained: Vec<Session> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, s)| s).collect()
        };
        drained
            .into_iter()
            .map(|s| Self::finish(s, reason))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Move an already-removed session to `closed` and notify its handles.
    fn finish(mut session: Session, reason: ClosureReason) -> SessionSnapshot {
        if let Err(e) = session.close() {
            warn!(session_id = %session.id, error = %e, "Session was already closed");
        }
        for participant in session.participants() {
            participant.connection.close(ServerMessage::SessionClosed {
                session_id: session.id.clone(),
                reason,
            });
        }
        info!(session_id = %session.id, %reason, "Session closed");
        session.snapshot()
    }
}
