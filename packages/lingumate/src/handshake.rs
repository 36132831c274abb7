//! Handshake Server
//!
//! Creates sessions, pairs the second participant, rebinds reattaching
//! participants and handles explicit close requests.

use lingumate_protocol::{
    ClosureReason, LanguagePair, LanguageTag, ParticipantInfo, ServerMessage, SessionState,
};
use tracing::info;

use crate::audit::SessionEvent;
use crate::error::SessionError;
use crate::registry::JoinOutcome;
use crate::ws::ConnectionContext;

/// Decoded `init_translation_session` payload.
#[derive(Debug, Clone)]
pub struct InitRequest {
    pub user: ParticipantInfo,
    pub user1_language: LanguageTag,
    pub user2_language: LanguageTag,
    pub session_id: Option<String>,
}

pub async fn on_init(ctx: &ConnectionContext, request: InitRequest) -> Result<(), SessionError> {
    let InitRequest {
        user,
        user1_language,
        user2_language,
        session_id,
    } = request;

    if user.id.trim().is_empty() {
        return Err(SessionError::Malformed("user.id must not be empty".to_string()));
    }
    if user1_language == user2_language {
        return Err(SessionError::Malformed(format!(
            "user1Language and user2Language must differ (both {user1_language})"
        )));
    }
    let declared = LanguagePair::new(user1_language, user2_language);
    let state = &ctx.state;

    // A connection represents at most one participant in one session
    if let Some(bound) = ctx.binding() {
        match state.registry.lookup(&bound.session_id).await {
            Ok(snapshot) => {
                let same = session_id.as_deref() == Some(bound.session_id.as_str())
                    && user.id == bound.participant_id;
                if !same {
                    return Err(SessionError::AlreadyInSession {
                        session_id: bound.session_id,
                        participant_id: bound.participant_id,
                    });
                }
                ctx.reply(ServerMessage::TranslationSessionCreated {
                    session_id: snapshot.session_id,
                    state: snapshot.state,
                })
                .await;
                return Ok(());
            }
            // The old session is gone; this connection may start over
            Err(_) => ctx.unbind(),
        }
    }

    let Some(session_id) = session_id else {
        let participant_id = user.id.clone();
        let snapshot = state
            .registry
            .create_session(user, declared, ctx.handle.clone())
            .await;
        ctx.bind(&snapshot.session_id, &participant_id);
        state.metrics.session_created();
        state.session_event(
            &snapshot.session_id,
            SessionEvent::Created,
            Some(format!("{participant_id} {}", snapshot.language_pair)),
        );
        ctx.reply(ServerMessage::TranslationSessionCreated {
            session_id: snapshot.session_id,
            state: SessionState::Initiating,
        })
        .await;
        return Ok(());
    };

    let joiner = user.clone();
    let outcome = state
        .registry
        .join(&session_id, user, &declared, ctx.handle.clone())
        .await?;
    ctx.bind(&session_id, &joiner.id);

    match outcome {
        JoinOutcome::Joined {
            snapshot,
            initiator,
        } => {
            state.metrics.session_paired();
            state.session_event(&session_id, SessionEvent::Paired, Some(joiner.id.clone()));
            ctx.reply(ServerMessage::TranslationSessionCreated {
                session_id: session_id.clone(),
                state: snapshot.state,
            })
            .await;
            initiator
                .send(ServerMessage::ParticipantJoined {
                    session_id,
                    participant: joiner,
                })
                .await;
        }
        JoinOutcome::Reattached { snapshot, previous } => {
            // The old socket no longer represents anyone
            if previous.id() != ctx.conn_id() {
                previous.close(ServerMessage::SessionClosed {
                    session_id: session_id.clone(),
                    reason: ClosureReason::Superseded,
                });
            }
            info!(
                session_id = %session_id,
                participant_id = %joiner.id,
                previous_conn = %previous.id(),
                conn_id = %ctx.conn_id(),
                "Participant moved to a new connection"
            );
            state.session_event(&session_id, SessionEvent::Reattached, Some(joiner.id));
            ctx.reply(ServerMessage::TranslationSessionCreated {
                session_id,
                state: snapshot.state,
            })
            .await;
        }
    }
    Ok(())
}

pub async fn on_close(
    ctx: &ConnectionContext,
    session_id: &str,
    sender_id: &str,
) -> Result<(), SessionError> {
    ctx.state.registry.lookup(session_id).await?;

    if let Some(bound) = ctx.binding() {
        if bound.session_id != session_id || bound.participant_id != sender_id {
            return Err(SessionError::NotAParticipant {
                session_id: session_id.to_string(),
                participant_id: sender_id.to_string(),
            });
        }
    }

    // The registry delivers the closure notice to this connection as well
    let snapshot = ctx.state.registry.close_by(session_id, sender_id).await?;
    ctx.unbind();
    ctx.state
        .session_closed(&snapshot.session_id, ClosureReason::ClosedByParticipant);
    Ok(())
}
