//! WebSocket Handler
//!
//! Serves one socket on either endpoint until it closes, then tells the
//! registry the connection is gone.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use lingumate_protocol::ClosureReason;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::SessionError;
use crate::server::AppState;

use super::dispatch::{ConnectionContext, dispatch_frame};
use super::{ConnectionHandle, Endpoint, Outbound};

/// Frames read off the socket but not yet dispatched.
const INBOUND_QUEUE: usize = 32;

/// Handle a WebSocket connection on `endpoint`
pub async fn serve_socket(socket: WebSocket, state: AppState, endpoint: Endpoint) {
    let (handle, mut outbound_rx) = ConnectionHandle::new(state.config.session.outbound_queue);
    let conn_id = handle.id().to_string();
    info!(conn_id = %conn_id, %endpoint, "WebSocket connected");
    state.metrics.connection_opened();

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let ctx = Arc::new(ConnectionContext::new(state.clone(), handle, endpoint));

    // Task to send queued frames to the WebSocket
    let metrics = state.metrics.clone();
    let writer_conn = conn_id.clone();
    let writer_task = async move {
        while let Some(item) = outbound_rx.recv().await {
            let (message, ack, closing) = match item {
                Outbound::Frame { message, ack } => (message, ack, false),
                Outbound::Close { notice } => (notice, None, true),
            };
            let json = match serde_json::to_string(&message) {
                Ok(j) => j,
                Err(e) => {
                    error!(conn_id = %writer_conn, "Failed to serialize message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
            metrics.frame_sent();
            if let Some(ack) = ack {
                let _ = ack.send(());
            }
            if closing {
                // Nothing may follow a closure notice
                let _ = ws_sender.send(Message::Close(None)).await;
                break;
            }
        }
    };

    // Task to read frames off the socket. Dispatch happens elsewhere so a slow
    // provider call never stops us noticing the socket went away.
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<String>(INBOUND_QUEUE);
    let reader_ctx = ctx.clone();
    let reader_task = async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    reader_ctx.state.metrics.frame_received();
                    if inbound_tx.send(text.as_str().to_owned()).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Binary(_)) => {
                    reader_ctx.state.metrics.frame_received();
                    reader_ctx.state.metrics.frame_malformed();
                    reader_ctx
                        .reply_error(&SessionError::Malformed(
                            "binary frames are not supported".to_string(),
                        ))
                        .await;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(conn_id = %reader_ctx.conn_id(), "WebSocket read error: {}", e);
                    break;
                }
            }
        }
    };

    // Task to dispatch frames in arrival order
    let worker_ctx = ctx.clone();
    let worker_task = async move {
        while let Some(text) = inbound_rx.recv().await {
            dispatch_frame(&worker_ctx, &text).await;
        }
    };

    tokio::select! {
        _ = writer_task => debug!(conn_id = %conn_id, "Writer finished"),
        _ = reader_task => debug!(conn_id = %conn_id, "Reader finished"),
        _ = worker_task => debug!(conn_id = %conn_id, "Worker finished"),
    }

    if let Some(binding) = ctx.binding() {
        if let Some(snapshot) = state
            .registry
            .connection_lost(&binding.session_id, &binding.participant_id, &conn_id)
            .await
        {
            state.session_closed(&snapshot.session_id, ClosureReason::PeerDisconnected);
        }
    }

    state.metrics.connection_closed();
    info!(conn_id = %conn_id, %endpoint, "WebSocket disconnected");
}

