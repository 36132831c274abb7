//! Per-connection message dispatcher.
//!
//! Frames are decoded once here into a [`ClientMessage`]; everything past
//! this point works with typed messages. Any failure becomes an error frame
//! for the connection that triggered it, never for anyone else.

use std::sync::Mutex;

use lingumate_protocol::{ClientMessage, ServerMessage, decode_client_message};
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::handshake::{self, InitRequest};
use crate::relay::{self, RelayRequest};
use crate::server::AppState;

use super::{ConnectionHandle, Endpoint};

/// The connection's back-reference into the registry: a lookup key, never
/// ownership of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub session_id: String,
    pub participant_id: String,
}

/// Per-connection context shared between the socket tasks and the handlers.
pub struct ConnectionContext {
    pub state: AppState,
    pub handle: ConnectionHandle,
    pub endpoint: Endpoint,
    // Plain mutex: binding must happen with no await point after a join, so a
    // cancelled worker can never leave a seated participant unbound.
    binding: Mutex<Option<Binding>>,
}

impl ConnectionContext {
    pub fn new(state: AppState, handle: ConnectionHandle, endpoint: Endpoint) -> Self {
        Self {
            state,
            handle,
            endpoint,
            binding: Mutex::new(None),
        }
    }

    pub fn conn_id(&self) -> &str {
        self.handle.id()
    }

    pub fn binding(&self) -> Option<Binding> {
        self.binding
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn bind(&self, session_id: &str, participant_id: &str) {
        *self
            .binding
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Binding {
            session_id: session_id.to_string(),
            participant_id: participant_id.to_string(),
        });
    }

    pub fn unbind(&self) {
        self.binding
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }

    /// Queue a frame for this connection only.
    pub async fn reply(&self, message: ServerMessage) {
        if !self.handle.send(message).await {
            debug!(conn_id = %self.conn_id(), "Reply dropped, connection closed");
        }
    }

    pub async fn reply_error(&self, error: &SessionError) {
        self.reply(ServerMessage::Error(error.to_frame())).await;
    }
}

/// Decode one text frame and route it to the handshake or relay handler.
pub async fn dispatch_frame(ctx: &ConnectionContext, text: &str) {
    let message = match decode_client_message(text) {
        Ok(message) => message,
        Err(e) => {
            ctx.state.metrics.frame_malformed();
            debug!(conn_id = %ctx.conn_id(), error = %e, "Rejecting malformed frame");
            ctx.reply_error(&SessionError::Malformed(e.to_string())).await;
            return;
        }
    };

    let kind = message.kind();
    let result = match (ctx.endpoint, message) {
        (Endpoint::Handshake, ClientMessage::TextTranslation { .. }) => {
            Err(SessionError::Unsupported {
                kind,
                endpoint: Endpoint::Handshake.as_str(),
            })
        }
        (
            _,
            ClientMessage::InitTranslationSession {
                user,
                user1_language,
                user2_language,
                session_id,
            },
        ) => {
            handshake::on_init(
                ctx,
                InitRequest {
                    user,
                    user1_language,
                    user2_language,
                    session_id,
                },
            )
            .await
        }
        (
            _,
            ClientMessage::CloseSession {
                session_id,
                sender_id,
            },
        ) => handshake::on_close(ctx, &session_id, &sender_id).await,
        (
            Endpoint::Relay,
            ClientMessage::TextTranslation {
                text,
                source_language,
                target_language,
                sender_id,
                session_id,
            },
        ) => {
            relay::on_text_translation(
                ctx,
                RelayRequest {
                    text,
                    source_language,
                    target_language,
                    sender_id,
                    session_id,
                },
            )
            .await
        }
    };

    if let Err(e) = result {
        match &e {
            SessionError::Malformed(_) | SessionError::Unsupported { .. } => {
                ctx.state.metrics.frame_malformed();
                debug!(conn_id = %ctx.conn_id(), kind, error = %e, "Request rejected");
            }
            SessionError::TranslationProvider(_) | SessionError::PartialDelivery { .. } => {
                warn!(conn_id = %ctx.conn_id(), kind, error = %e, "Request failed");
            }
            _ => {
                debug!(conn_id = %ctx.conn_id(), kind, code = %e.error_code(), error = %e, "Request refused");
            }
        }
        ctx.reply_error(&e).await;
    }
}
