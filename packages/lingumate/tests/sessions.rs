//! End-to-end session behavior over real sockets.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Client, FailingProvider, HangingProvider, TestServer};
use lingumate::provider::{EchoTranslationProvider, ProviderError};
use lingumate::smoke::{SMOKE_TEXT, run_smoke};

const QUIET: Duration = Duration::from_millis(300);

#[tokio::test]
async fn relay_round_trip_reaches_both_participants() {
    let server = TestServer::start().await;
    let (session_id, mut alice, mut bob) = server.paired().await;

    alice
        .translate(&session_id, "u1", "Hello, how are you?", "en", "es")
        .await;

    let to_sender = alice.recv_kind("translation_result").await;
    let to_peer = bob.recv_kind("translation_result").await;
    assert_eq!(to_sender, to_peer);

    let message = &to_peer["message"];
    assert_eq!(message["originalText"], "Hello, how are you?");
    assert_eq!(message["translatedText"], "[es] Hello, how are you?");
    assert_eq!(message["senderId"], "u1");
    assert_eq!(message["sessionId"], session_id.as_str());
    assert_eq!(message["sourceLanguage"], "en");
    assert_eq!(message["targetLanguage"], "es");
}

#[tokio::test]
async fn handshake_pairing_then_relay_reattach() {
    let server = TestServer::start().await;

    let mut alice_hs = server.handshake_client().await;
    let created = alice_hs.init("u1", "en", ("en", "es"), None).await;
    assert_eq!(created["type"], "translation_session_created");
    assert_eq!(created["state"], "initiating");
    let session_id = created["sessionId"].as_str().unwrap().to_string();

    let mut bob_hs = server.handshake_client().await;
    let joined = bob_hs
        .init("u2", "es", ("en", "es"), Some(&session_id))
        .await;
    assert_eq!(joined["state"], "active");
    let notice = alice_hs.recv_kind("participant_joined").await;
    assert_eq!(notice["participant"]["id"], "u2");
    assert_eq!(notice["participant"]["preferredLanguage"], "es");

    // Both move to the relay endpoint
    let mut alice = server.relay_client().await;
    let reattached = alice.init("u1", "en", ("en", "es"), Some(&session_id)).await;
    assert_eq!(reattached["type"], "translation_session_created");
    assert_eq!(reattached["state"], "active");
    let mut bob = server.relay_client().await;
    bob.init("u2", "es", ("en", "es"), Some(&session_id)).await;

    // The handshake sockets are told they were replaced, then closed
    for old in [&mut alice_hs, &mut bob_hs] {
        let notice = old.recv_kind("session_closed").await;
        assert_eq!(notice["sessionId"], session_id.as_str());
        assert_eq!(notice["reason"], "superseded");
        old.expect_closed().await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.server.state().registry.is_active(&session_id).await);

    bob.translate(&session_id, "u2", "Hola", "es", "en").await;
    let result = alice.recv_kind("translation_result").await;
    assert_eq!(result["message"]["translatedText"], "[en] Hola");
    bob.recv_kind("translation_result").await;
}

#[tokio::test]
async fn smoke_client_passes_against_bare_relay_url() {
    let server = TestServer::start().await;
    let report = run_smoke(&server.relay_root_url(), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(report.original_text, SMOKE_TEXT);
    assert_eq!(report.translated_text, format!("[es] {SMOKE_TEXT}"));
    assert!(report.session_id.starts_with("sess_"));
}

#[tokio::test]
async fn text_translation_is_unsupported_on_handshake() {
    let server = TestServer::start().await;
    let mut client = server.handshake_client().await;
    client.translate("sess_any", "u1", "Hi", "en", "es").await;
    let error = client.recv_error("unsupported_message").await;
    assert_eq!(error["retryable"], false);

    // Connection stays usable
    let created = client.init("u1", "en", ("en", "es"), None).await;
    assert_eq!(created["type"], "translation_session_created");
}

#[tokio::test]
async fn mismatched_join_leaves_session_open() {
    let server = TestServer::start().await;
    let mut alice = server.relay_client().await;
    let created = alice.init("u1", "en", ("en", "es"), None).await;
    let session_id = created["sessionId"].as_str().unwrap().to_string();

    let mut stranger = server.relay_client().await;
    let rejected = stranger
        .init("u3", "fr", ("en", "fr"), Some(&session_id))
        .await;
    assert_eq!(rejected["type"], "error");
    assert_eq!(rejected["code"], "language_pair_mismatch");

    // Reversed order is the same pair
    let mut bob = server.relay_client().await;
    let joined = bob.init("u2", "es", ("es", "en"), Some(&session_id)).await;
    assert_eq!(joined["state"], "active");
    alice.recv_kind("participant_joined").await;
}

#[tokio::test]
async fn concurrent_joiners_seat_exactly_one() {
    let server = TestServer::start().await;
    let mut alice = server.relay_client().await;
    let created = alice.init("u1", "en", ("en", "es"), None).await;
    let session_id = created["sessionId"].as_str().unwrap().to_string();

    let mut joiners = Vec::new();
    for _ in 0..8 {
        joiners.push(Client::connect(&server.relay_url()).await);
    }
    let attempts = joiners.iter_mut().enumerate().map(|(i, client)| {
        let session_id = session_id.clone();
        async move {
            client
                .init(&format!("joiner-{i}"), "es", ("en", "es"), Some(&session_id))
                .await
        }
    });
    let replies = futures::future::join_all(attempts).await;

    let seated = replies
        .iter()
        .filter(|r| r["type"] == "translation_session_created")
        .count();
    let full = replies
        .iter()
        .filter(|r| r["type"] == "error" && r["code"] == "session_full")
        .count();
    assert_eq!(seated, 1);
    assert_eq!(full, 7);

    alice.recv_kind("participant_joined").await;
    alice.expect_silence(QUIET).await;
}

#[tokio::test]
async fn disconnect_notifies_remaining_participant() {
    let server = TestServer::start().await;
    let (session_id, mut alice, bob) = server.paired().await;

    bob.disconnect().await;

    let notice = alice.recv_kind("session_closed").await;
    assert_eq!(notice["sessionId"], session_id.as_str());
    assert_eq!(notice["reason"], "peer_disconnected");
    alice.expect_closed().await;

    let mut late = server.relay_client().await;
    late.translate(&session_id, "u1", "Anyone?", "en", "es").await;
    late.recv_error("session_not_found").await;
}

#[tokio::test]
async fn close_session_notifies_both() {
    let server = TestServer::start().await;
    let (session_id, mut alice, mut bob) = server.paired().await;

    alice.close_session(&session_id, "u1").await;

    for client in [&mut alice, &mut bob] {
        let notice = client.recv_kind("session_closed").await;
        assert_eq!(notice["reason"], "closed_by_participant");
    }
    assert!(server.server.state().registry.is_empty().await);
}

#[tokio::test]
async fn idle_sessions_are_reaped() {
    let server = TestServer::start_with(Arc::new(EchoTranslationProvider), |c| {
        c.session.idle_timeout = Some(Duration::from_millis(300));
        c.session.reap_interval = Duration::from_millis(50);
    })
    .await;
    let (session_id, mut alice, mut bob) = server.paired().await;

    for client in [&mut alice, &mut bob] {
        let notice = client.recv_kind("session_closed").await;
        assert_eq!(notice["reason"], "idle_timeout");
    }

    let mut late = server.relay_client().await;
    late.translate(&session_id, "u1", "Still there?", "en", "es").await;
    late.recv_error("session_not_found").await;
}

#[tokio::test]
async fn provider_failure_stays_with_sender() {
    let server =
        TestServer::start_with(Arc::new(FailingProvider(ProviderError::Quota)), |_| {}).await;
    let (session_id, mut alice, mut bob) = server.paired().await;

    alice.translate(&session_id, "u1", "Hello", "en", "es").await;
    let error = alice.recv_error("translation_provider_error").await;
    assert_eq!(error["retryable"], true);
    bob.expect_silence(QUIET).await;

    // Session survives the failure
    assert!(server.server.state().registry.is_active(&session_id).await);
}

#[tokio::test]
async fn hung_provider_call_only_blocks_its_own_session() {
    let server = TestServer::start_with(Arc::new(HangingProvider), |c| {
        c.provider.timeout = Duration::from_millis(500);
    })
    .await;
    let (stuck_id, mut stuck_alice, mut stuck_bob) = server.paired().await;
    let (live_id, mut live_alice, mut live_bob) = server.paired().await;

    stuck_alice.translate(&stuck_id, "u1", "hang", "en", "es").await;
    live_alice.translate(&live_id, "u1", "Hello", "en", "es").await;

    let started = std::time::Instant::now();
    live_bob.recv_kind("translation_result").await;
    live_alice.recv_kind("translation_result").await;
    assert!(started.elapsed() < Duration::from_millis(500));

    stuck_alice.recv_error("translation_provider_error").await;
    stuck_bob.expect_silence(QUIET).await;
}

#[tokio::test]
async fn bound_connection_naming_unknown_session_gets_not_found() {
    let server = TestServer::start().await;
    let (session_id, mut alice, mut bob) = server.paired().await;

    alice.translate("sess_bogus", "u1", "Hello", "en", "es").await;
    alice.recv_error("session_not_found").await;

    alice.close_session("sess_bogus", "u1").await;
    alice.recv_error("session_not_found").await;

    bob.expect_silence(QUIET).await;
    assert!(server.server.state().registry.is_active(&session_id).await);
}

#[tokio::test]
async fn reattach_with_a_different_pair_is_rejected() {
    let server = TestServer::start().await;
    let (session_id, _alice, _bob) = server.paired().await;

    let mut imposter = server.relay_client().await;
    let reply = imposter
        .init("u1", "en", ("en", "fr"), Some(&session_id))
        .await;
    assert_eq!(reply["code"], "language_pair_mismatch");
}

#[tokio::test]
async fn text_before_pairing_is_rejected() {
    let server = TestServer::start().await;
    let mut alice = server.relay_client().await;
    let created = alice.init("u1", "en", ("en", "es"), None).await;
    let session_id = created["sessionId"].as_str().unwrap();

    alice.translate(session_id, "u1", "Hello?", "en", "es").await;
    alice.recv_error("session_not_active").await;
}

#[tokio::test]
async fn sender_must_match_connection() {
    let server = TestServer::start().await;
    let (session_id, mut alice, mut bob) = server.paired().await;

    alice.translate(&session_id, "u2", "Spoofed", "es", "en").await;
    alice.recv_error("not_a_participant").await;
    bob.expect_silence(QUIET).await;
}

#[tokio::test]
async fn languages_outside_pair_are_rejected() {
    let server = TestServer::start().await;
    let (session_id, mut alice, _bob) = server.paired().await;

    alice.translate(&session_id, "u1", "Bonjour", "fr", "es").await;
    alice.recv_error("language_pair_mismatch").await;
}

#[tokio::test]
async fn unknown_session_and_malformed_frames() {
    let server = TestServer::start().await;
    let mut client = server.relay_client().await;

    client.translate("sess_missing", "u1", "Hi", "en", "es").await;
    client.recv_error("session_not_found").await;

    client.send_text("{not json").await;
    client.recv_error("malformed_message").await;

    client.send_text(r#"{"type":"teleport"}"#).await;
    client.recv_error("malformed_message").await;

    let joined = client
        .init("u1", "en", ("en", "es"), Some("sess_missing"))
        .await;
    assert_eq!(joined["code"], "session_not_found");
}

#[tokio::test]
async fn shutdown_closes_open_sessions() {
    let server = TestServer::start().await;
    let (_session_id, mut alice, mut bob) = server.paired().await;

    server.shutdown().await;

    for client in [&mut alice, &mut bob] {
        let notice = client.recv_kind("session_closed").await;
        assert_eq!(notice["reason"], "server_shutdown");
    }
}
