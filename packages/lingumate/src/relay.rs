//! Translation Relay Server
//!
//! Resolves the session, calls the provider outside any registry lock and
//! fans the result out to both participants.

use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use lingumate_protocol::{LanguagePair, LanguageTag, ServerMessage};
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::provider::{TranslationRequest, translate_with_deadline};
use crate::session::TranslationMessage;
use crate::ws::{ConnectionContext, ConnectionHandle};

/// Decoded `text_translation` payload.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub text: String,
    pub source_language: LanguageTag,
    pub target_language: LanguageTag,
    pub sender_id: String,
    pub session_id: String,
}

pub async fn on_text_translation(
    ctx: &ConnectionContext,
    request: RelayRequest,
) -> Result<(), SessionError> {
    let state = &ctx.state;
    let RelayRequest {
        text,
        source_language,
        target_language,
        sender_id,
        session_id,
    } = request;

    if text.trim().is_empty() {
        return Err(SessionError::Malformed("text must not be empty".to_string()));
    }

    // Unknown or closed sessions are reported as such before any identity check
    let targets = state.registry.relay_targets(&session_id, &sender_id).await?;

    // A bound connection may only speak for its own participant
    if let Some(bound) = ctx.binding() {
        if bound.session_id != session_id || bound.participant_id != sender_id {
            return Err(SessionError::NotAParticipant {
                session_id,
                participant_id: sender_id,
            });
        }
    }

    if !targets
        .language_pair
        .covers(&source_language, &target_language)
    {
        return Err(SessionError::LanguagePairMismatch {
            expected: targets.language_pair,
            declared: LanguagePair::new(source_language, target_language),
        });
    }

    let translated_text = if source_language == target_language {
        text.clone()
    } else {
        let provider_request = TranslationRequest {
            text: text.clone(),
            source: source_language.clone(),
            target: target_language.clone(),
        };
        translate_with_deadline(
            state.provider.as_ref(),
            &provider_request,
            state.config.provider.timeout,
        )
        .await
        .inspect_err(|e| {
            state.metrics.provider_error();
            warn!(
                session_id = %session_id,
                provider = state.provider.name(),
                error = %e,
                "Translation failed"
            );
        })?
    };

    let message = TranslationMessage {
        sender_id: sender_id.clone(),
        session_id: session_id.clone(),
        original_text: text,
        source_language,
        target_language,
        translated_text,
        timestamp: Utc::now(),
    };

    // The session may have closed (or a participant moved) while the provider
    // call was in flight; resolve the recipients again.
    let targets = state
        .registry
        .relay_targets(&session_id, &sender_id)
        .await
        .map_err(|_| SessionError::SessionNotFound(session_id.clone()))?;

    let undelivered = fan_out(
        &message.to_frame(),
        &targets.recipients,
        state.config.relay.delivery_timeout,
    )
    .await;
    state.registry.touch(&session_id).await;
    state.audit_message(message);

    if undelivered.is_empty() {
        state.metrics.translation_relayed();
        return Ok(());
    }
    if !state.registry.is_active(&session_id).await {
        // Closed mid-delivery; the closure notice explains the rest
        return Err(SessionError::SessionNotFound(session_id));
    }
    state.metrics.partial_delivery();
    Err(SessionError::PartialDelivery {
        session_id,
        undelivered: undelivered.join(", "),
    })
}

/// Deliver `frame` to every recipient concurrently. A failed leg is retried
/// once on its own, so a recipient that already got the frame never sees it
/// twice. Returns the participant ids that still did not receive it.
pub async fn fan_out(
    frame: &ServerMessage,
    recipients: &[(String, ConnectionHandle)],
    timeout: Duration,
) -> Vec<String> {
    let everyone: Vec<usize> = (0..recipients.len()).collect();
    let failed = deliver_to(frame, recipients, &everyone, timeout).await;
    if failed.is_empty() {
        return Vec::new();
    }

    deliver_to(frame, recipients, &failed, timeout)
        .await
        .into_iter()
        .map(|i| recipients[i].0.clone())
        .collect()
}

/// One concurrent delivery round over `indices`; returns the ones that failed.
async fn deliver_to(
    frame: &ServerMessage,
    recipients: &[(String, ConnectionHandle)],
    indices: &[usize],
    timeout: Duration,
) -> Vec<usize> {
    let results = join_all(indices.iter().map(|&i| {
        let (participant_id, handle) = &recipients[i];
        async move {
            let result = handle.deliver(frame.clone(), timeout).await;
            (i, participant_id, handle, result)
        }
    }))
    .await;

    results
        .into_iter()
        .filter_map(|(i, participant_id, handle, result)| match result {
            Ok(()) => None,
            Err(e) => {
                debug!(
                    participant_id = %participant_id,
                    conn_id = %handle.id(),
                    error = %e,
                    "Delivery leg failed"
                );
                Some(i)
            }
        })
        .collect()
}
