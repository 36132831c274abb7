//! Optional audit log of relayed messages and session lifecycle events.
//!
//! Writes happen off the request path; a failing sink is logged and never
//! affects delivery.

use std::fmt;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::config::AuditConfig;
use crate::session::TranslationMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Created,
    Paired,
    Reattached,
    Closed,
}

impl SessionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Paired => "paired",
            Self::Reattached => "reattached",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_message(&self, message: &TranslationMessage) -> Result<()>;

    async fn record_session_event(
        &self,
        session_id: &str,
        event: SessionEvent,
        detail: Option<&str>,
    ) -> Result<()>;
}

/// A stored `translation_messages` row.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuditedMessage {
    pub session_id: String,
    pub sender_id: String,
    pub source_language: String,
    pub target_language: String,
    pub original_text: String,
    pub translated_text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SqliteAuditLog {
    pub pool: SqlitePool,
}

impl SqliteAuditLog {
    pub async fn open(config: &AuditConfig) -> Result<Self> {
        info!("Opening audit log: {}", config.db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .connect(&config.db_url())
            .await
            .with_context(|| format!("Failed to open audit log: {}", config.db_url()))?;

        run_migrations(&pool).await?;

        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    /// Use an existing pool (migrations are applied).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn messages_for(&self, session_id: &str) -> Result<Vec<AuditedMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, sender_id, source_language, target_language,
                   original_text, translated_text, timestamp
            FROM translation_messages
            WHERE session_id = ?
            ORDER BY id
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(AuditedMessage {
                    session_id: row.try_get("session_id")?,
                    sender_id: row.try_get("sender_id")?,
                    source_language: row.try_get("source_language")?,
                    target_language: row.try_get("target_language")?,
                    original_text: row.try_get("original_text")?,
                    translated_text: row.try_get("translated_text")?,
                    timestamp: row.try_get("timestamp")?,
                })
            })
            .collect()
    }

    /// Lifecycle events for a session, oldest first, as `(event, detail)`.
    pub async fn events_for(&self, session_id: &str) -> Result<Vec<(String, Option<String>)>> {
        let rows = sqlx::query("SELECT event, detail FROM session_events WHERE session_id = ? ORDER BY id")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| Ok((row.try_get("event")?, row.try_get("detail")?)))
            .collect()
    }
}

#[async_trait]
impl AuditSink for SqliteAuditLog {
    async fn record_message(&self, message: &TranslationMessage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO translation_messages
                (session_id, sender_id, source_language, target_language,
                 original_text, translated_text, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.session_id)
        .bind(&message.sender_id)
        .bind(message.source_language.as_str())
        .bind(message.target_language.as_str())
        .bind(&message.original_text)
        .bind(&message.translated_text)
        .bind(message.timestamp)
        .execute(&self.pool)
        .await
        .context("Failed to record translation message")?;
        Ok(())
    }

    async fn record_session_event(
        &self,
        session_id: &str,
        event: SessionEvent,
        detail: Option<&str>,
    ) -> Result<()> {
        sqlx::query("INSERT INTO session_events (session_id, event, detail) VALUES (?, ?, ?)")
            .bind(session_id)
            .bind(event.as_str())
            .bind(detail)
            .execute(&self.pool)
            .await
            .context("Failed to record session event")?;
        Ok(())
    }
}

/// Current schema version - increment when adding migrations
const SCHEMA_VERSION: i64 = 1;

pub(crate) async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL DEFAULT (unixepoch()),
            description TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current_version: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    if current_version > SCHEMA_VERSION {
        anyhow::bail!(
            "Audit schema version {} is newer than supported version {}. Please upgrade the application.",
            current_version,
            SCHEMA_VERSION
        );
    }

    if current_version == SCHEMA_VERSION {
        return Ok(());
    }

    info!(
        "Migrating audit log from version {} to {}",
        current_version, SCHEMA_VERSION
    );

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS translation_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            source_language TEXT NOT NULL,
            target_language TEXT NOT NULL,
            original_text TEXT NOT NULL,
            translated_text TEXT NOT NULL,
            timestamp TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_msg_session ON translation_messages(session_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS session_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            event TEXT NOT NULL,
            detail TEXT,
            recorded_at INTEGER NOT NULL DEFAULT (unixepoch())
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_event_session ON session_events(session_id)")
        .execute(pool)
        .await?;

    sqlx::query("INSERT OR REPLACE INTO schema_version (version, description) VALUES (?, ?)")
        .bind(SCHEMA_VERSION)
        .bind("translation_messages, session_events")
        .execute(pool)
        .await?;
    info!("Audit schema upgraded to version {}", SCHEMA_VERSION);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingumate_protocol::LanguageTag;
    use std::path::PathBuf;

    async fn test_log() -> SqliteAuditLog {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteAuditLog::from_pool(pool).await.unwrap()
    }

    fn message(text: &str) -> TranslationMessage {
        TranslationMessage {
            sender_id: "u1".into(),
            session_id: "sess_1".into(),
            original_text: text.into(),
            source_language: LanguageTag::parse("en").unwrap(),
            target_language: LanguageTag::parse("es").unwrap(),
            translated_text: format!("[es] {text}"),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn run_migrations_idempotent() {
        let log = test_log().await;
        run_migrations(&log.pool).await.unwrap();
        run_migrations(&log.pool).await.unwrap();

        let version: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
                .fetch_one(&log.pool)
                .await
                .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn records_messages_in_order() {
        let log = test_log().await;
        log.record_message(&message("Hello")).await.unwrap();
        log.record_message(&message("Bye")).await.unwrap();

        let stored = log.messages_for("sess_1").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].original_text, "Hello");
        assert_eq!(stored[0].translated_text, "[es] Hello");
        assert_eq!(stored[0].source_language, "en");
        assert_eq!(stored[1].original_text, "Bye");

        assert!(log.messages_for("sess_other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn records_session_events() {
        let log = test_log().await;
        log.record_session_event("sess_1", SessionEvent::Created, Some("u1 en/es"))
            .await
            .unwrap();
        log.record_session_event("sess_1", SessionEvent::Closed, None)
            .await
            .unwrap();

        let events = log.events_for("sess_1").await.unwrap();
        assert_eq!(
            events,
            vec![
                ("created".to_string(), Some("u1 en/es".to_string())),
                ("closed".to_string(), None),
            ]
        );
    }

    #[tokio::test]
    async fn open_creates_database_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config = AuditConfig {
            enabled: true,
            db_path: PathBuf::from(tmp.path().join("audit.db")),
        };
        let log = SqliteAuditLog::open(&config).await.unwrap();
        log.record_message(&message("Hi")).await.unwrap();
        assert!(config.db_path.exists());
    }
}
