//! Shared harness: real servers on ephemeral ports, driven by WebSocket clients.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use lingumate::config::{FileConfig, ServiceConfig};
use lingumate::provider::{
    EchoTranslationProvider, ProviderError, TranslationProvider, TranslationRequest,
};
use lingumate::server::{AppState, RunningServer};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub server: RunningServer,
    _data_dir: tempfile::TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(Arc::new(EchoTranslationProvider), |_| {}).await
    }

    pub async fn start_with(
        provider: Arc<dyn TranslationProvider>,
        tweak: impl FnOnce(&mut ServiceConfig),
    ) -> Self {
        let data_dir = tempfile::tempdir().unwrap();
        let mut file_config = FileConfig::default();
        file_config.server.handshake_port = 0;
        file_config.server.relay_port = 0;
        file_config.server.environment = "test".into();
        let mut config = ServiceConfig::from_file(&file_config, data_dir.path()).unwrap();
        tweak(&mut config);

        let state = AppState::new(config, provider, None);
        let handshake = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let relay = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = RunningServer::start(state, handshake, relay).unwrap();
        Self {
            server,
            _data_dir: data_dir,
        }
    }

    pub async fn shutdown(self) {
        self.server.shutdown().await;
    }

    pub fn handshake_url(&self) -> String {
        format!("ws://{}/ws", self.server.handshake_addr)
    }

    pub fn relay_url(&self) -> String {
        format!("ws://{}/ws", self.server.relay_addr)
    }

    /// The bare URL the legacy smoke client used.
    pub fn relay_root_url(&self) -> String {
        format!("ws://{}", self.server.relay_addr)
    }

    pub async fn handshake_client(&self) -> Client {
        Client::connect(&self.handshake_url()).await
    }

    pub async fn relay_client(&self) -> Client {
        Client::connect(&self.relay_url()).await
    }

    /// Create a session as `u1` (en) and pair `u2` (es) into it, both on the
    /// relay endpoint. Returns (session id, u1, u2) with all setup frames read.
    pub async fn paired(&self) -> (String, Client, Client) {
        let mut alice = self.relay_client().await;
        let created = alice.init("u1", "en", ("en", "es"), None).await;
        let session_id = created["sessionId"].as_str().unwrap().to_string();

        let mut bob = self.relay_client().await;
        let joined = bob.init("u2", "es", ("en", "es"), Some(&session_id)).await;
        assert_eq!(joined["type"], "translation_session_created");
        assert_eq!(joined["state"], "active");
        alice.recv_kind("participant_joined").await;

        (session_id, alice, bob)
    }
}

pub struct Client {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Client {
    pub async fn connect(url: &str) -> Self {
        let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        Self { ws }
    }

    pub async fn send_json(&mut self, value: Value) {
        self.send_text(&value.to_string()).await;
    }

    pub async fn send_text(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string().into()))
            .await
            .unwrap();
    }

    /// Next JSON frame, or `None` once the server has closed the socket.
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for a frame");
            match frame {
                Some(Ok(Message::Text(text))) => {
                    return Some(serde_json::from_str(text.as_str()).unwrap());
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
                Some(Ok(_)) => {}
            }
        }
    }

    pub async fn recv_kind(&mut self, kind: &str) -> Value {
        let frame = self
            .recv()
            .await
            .unwrap_or_else(|| panic!("connection closed while waiting for {kind}"));
        assert_eq!(frame["type"], kind, "unexpected frame: {frame}");
        frame
    }

    pub async fn recv_error(&mut self, code: &str) -> Value {
        let frame = self.recv_kind("error").await;
        assert_eq!(frame["code"], code, "unexpected error: {frame}");
        frame
    }

    /// Assert nothing arrives for `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(frame) = tokio::time::timeout(window, self.ws.next()).await {
            panic!("expected no frame, got {frame:?}");
        }
    }

    /// Assert the server closed the socket (after any closure notice).
    pub async fn expect_closed(&mut self) {
        assert!(self.recv().await.is_none(), "socket still open");
    }

    pub async fn init(
        &mut self,
        user_id: &str,
        language: &str,
        pair: (&str, &str),
        session_id: Option<&str>,
    ) -> Value {
        let mut frame = json!({
            "type": "init_translation_session",
            "user": { "id": user_id, "name": user_id.to_uppercase(), "preferredLanguage": language },
            "user1Language": pair.0,
            "user2Language": pair.1,
        });
        if let Some(id) = session_id {
            frame["sessionId"] = json!(id);
        }
        self.send_json(frame).await;
        self.recv().await.expect("connection closed during init")
    }

    pub async fn translate(
        &mut self,
        session_id: &str,
        sender_id: &str,
        text: &str,
        source: &str,
        target: &str,
    ) {
        self.send_json(json!({
            "type": "text_translation",
            "text": text,
            "sourceLanguage": source,
            "targetLanguage": target,
            "senderId": sender_id,
            "sessionId": session_id,
        }))
        .await;
    }

    pub async fn close_session(&mut self, session_id: &str, sender_id: &str) {
        self.send_json(json!({
            "type": "close_session",
            "sessionId": session_id,
            "senderId": sender_id,
        }))
        .await;
    }

    pub async fn disconnect(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Always fails with the given error.
pub struct FailingProvider(pub ProviderError);

#[async_trait]
impl TranslationProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn translate(&self, _request: &TranslationRequest) -> Result<String, ProviderError> {
        Err(self.0.clone())
    }
}

/// Echoes, except text "hang" which never completes.
pub struct HangingProvider;

#[async_trait]
impl TranslationProvider for HangingProvider {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn translate(&self, request: &TranslationRequest) -> Result<String, ProviderError> {
        if request.text == "hang" {
            std::future::pending::<()>().await;
        }
        EchoTranslationProvider.translate(request).await
    }
}
