//! End-to-end smoke test against a running relay endpoint.
//!
//! Opens two sockets, pairs them into one `en`/`es` session, sends a single
//! utterance from the first participant and waits for the translated result.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use futures::{Sink, SinkExt, Stream, StreamExt};
use lingumate_protocol::{ClientMessage, LanguageTag, ParticipantInfo, ServerMessage};
use tokio_tungstenite::tungstenite;
use tracing::debug;

pub const DEFAULT_SMOKE_URL: &str = "ws://localhost:3002";
pub const SMOKE_TEXT: &str = "Hello, how are you?";

#[derive(Debug, Clone)]
pub struct SmokeReport {
    pub session_id: String,
    pub original_text: String,
    pub translated_text: String,
    pub elapsed: Duration,
}

/// Run the smoke exchange, failing if it does not finish within `timeout`.
pub async fn run_smoke(url: &str, timeout: Duration) -> Result<SmokeReport> {
    tokio::time::timeout(timeout, exchange(url))
        .await
        .with_context(|| format!("No translation_result within {timeout:?}"))?
}

async fn exchange(url: &str) -> Result<SmokeReport> {
    let started = Instant::now();
    let en = LanguageTag::parse("en")?;
    let es = LanguageTag::parse("es")?;

    let (mut alice, _) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to {url}"))?;
    send(
        &mut alice,
        &ClientMessage::InitTranslationSession {
            user: participant("smoke-u1", "Smoke Alice", &en),
            user1_language: en.clone(),
            user2_language: es.clone(),
            session_id: None,
        },
    )
    .await?;
    let session_id = match next_message(&mut alice).await? {
        ServerMessage::TranslationSessionCreated { session_id, .. } => session_id,
        other => bail!("Expected translation_session_created, got {}", other.kind()),
    };
    debug!(session_id = %session_id, "Smoke session created");

    let (mut bob, _) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to {url}"))?;
    send(
        &mut bob,
        &ClientMessage::InitTranslationSession {
            user: participant("smoke-u2", "Smoke Bob", &es),
            user1_language: en.clone(),
            user2_language: es.clone(),
            session_id: Some(session_id.clone()),
        },
    )
    .await?;
    expect_kind(&mut bob, "translation_session_created").await?;
    expect_kind(&mut alice, "participant_joined").await?;

    send(
        &mut alice,
        &ClientMessage::TextTranslation {
            text: SMOKE_TEXT.to_string(),
            source_language: en,
            target_language: es,
            sender_id: "smoke-u1".to_string(),
            session_id: session_id.clone(),
        },
    )
    .await?;

    let result = match next_message(&mut alice).await? {
        ServerMessage::TranslationResult { message } => message,
        other => bail!("Expected translation_result, got {}", other.kind()),
    };
    // The peer must see the same utterance
    match next_message(&mut bob).await? {
        ServerMessage::TranslationResult { message } if message == result => {}
        other => bail!("Peer received {} instead of the same result", other.kind()),
    }

    let _ = alice.close(None).await;
    let _ = bob.close(None).await;

    Ok(SmokeReport {
        session_id,
        original_text: result.original_text,
        translated_text: result.translated_text,
        elapsed: started.elapsed(),
    })
}

fn participant(id: &str, name: &str, language: &LanguageTag) -> ParticipantInfo {
    ParticipantInfo {
        id: id.to_string(),
        name: name.to_string(),
        preferred_language: language.clone(),
    }
}

async fn send<S>(socket: &mut S, message: &ClientMessage) -> Result<()>
where
    S: Sink<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(message)?;
    socket
        .send(tungstenite::Message::Text(json.into()))
        .await
        .context("Failed to send frame")
}

/// Next protocol frame. Error frames are turned into an error.
async fn next_message<S>(socket: &mut S) -> Result<ServerMessage>
where
    S: Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = socket.next().await {
        match frame.context("WebSocket read failed")? {
            tungstenite::Message::Text(text) => {
                let message: ServerMessage = serde_json::from_str(text.as_str())
                    .with_context(|| format!("Unexpected frame: {}", text.as_str()))?;
                if let ServerMessage::Error(frame) = message {
                    bail!("Server error {}: {}", frame.code, frame.message);
                }
                return Ok(message);
            }
            tungstenite::Message::Close(_) => bail!("Server closed the connection"),
            _ => {}
        }
    }
    bail!("Connection ended")
}

async fn expect_kind<S>(socket: &mut S, kind: &str) -> Result<ServerMessage>
where
    S: Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let message = next_message(socket).await?;
    if message.kind() != kind {
        bail!("Expected {kind}, got {}", message.kind());
    }
    Ok(message)
}
