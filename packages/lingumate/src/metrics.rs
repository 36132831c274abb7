//! Server metrics for observability
//!
//! Counters shared by both endpoints, exposed as JSON on `/metrics` and
//! folded into `/health`.

use lingumate_protocol::ClosureReason;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Server-wide metrics
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Connection metrics
    /// Currently open WebSocket connections (both endpoints)
    pub active_connections: AtomicU64,
    /// Total connections since server start
    pub total_connections: AtomicU64,

    // Session metrics
    pub sessions_created: AtomicU64,
    /// Sessions that reached `active` with two participants
    pub sessions_paired: AtomicU64,
    pub closed_peer_disconnected: AtomicU64,
    pub closed_by_participant: AtomicU64,
    pub closed_idle_timeout: AtomicU64,
    pub closed_server_shutdown: AtomicU64,

    // Translation metrics
    /// Translations delivered to both participants
    pub translations_relayed: AtomicU64,
    pub provider_errors: AtomicU64,
    pub partial_deliveries: AtomicU64,

    // Frame metrics
    pub frames_received: AtomicU64,
    pub frames_sent: AtomicU64,
    /// Inbound frames rejected as malformed or unsupported
    pub frames_malformed: AtomicU64,

    /// Server start time (for uptime calculation)
    start_time: Option<Instant>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    // Connection tracking
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    // Session tracking
    pub fn session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_paired(&self) {
        self.sessions_paired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self, reason: ClosureReason) {
        let counter = match reason {
            ClosureReason::PeerDisconnected => &self.closed_peer_disconnected,
            ClosureReason::ClosedByParticipant => &self.closed_by_participant,
            ClosureReason::IdleTimeout => &self.closed_idle_timeout,
            ClosureReason::ServerShutdown => &self.closed_server_shutdown,
            // Only a connection went away, the session is still open
            ClosureReason::Superseded => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    // Translation tracking
    pub fn translation_relayed(&self) {
        self.translations_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn provider_error(&self) {
        self.provider_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn partial_delivery(&self) {
        self.partial_deliveries.fetch_add(1, Ordering::Relaxed);
    }

    // Frame tracking
    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_malformed(&self) {
        self.frames_malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let closed = ClosedMetrics {
            peer_disconnected: self.closed_peer_disconnected.load(Ordering::Relaxed),
            closed_by_participant: self.closed_by_participant.load(Ordering::Relaxed),
            idle_timeout: self.closed_idle_timeout.load(Ordering::Relaxed),
            server_shutdown: self.closed_server_shutdown.load(Ordering::Relaxed),
        };
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
            },
            sessions: SessionMetrics {
                created: self.sessions_created.load(Ordering::Relaxed),
                paired: self.sessions_paired.load(Ordering::Relaxed),
                closed,
            },
            translations: TranslationMetrics {
                relayed: self.translations_relayed.load(Ordering::Relaxed),
                provider_errors: self.provider_errors.load(Ordering::Relaxed),
                partial_deliveries: self.partial_deliveries.load(Ordering::Relaxed),
            },
            frames: FrameMetrics {
                received: self.frames_received.load(Ordering::Relaxed),
                sent: self.frames_sent.load(Ordering::Relaxed),
                malformed: self.frames_malformed.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub sessions: SessionMetrics,
    pub translations: TranslationMetrics,
    pub frames: FrameMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub created: u64,
    pub paired: u64,
    pub closed: ClosedMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedMetrics {
    pub peer_disconnected: u64,
    pub closed_by_participant: u64,
    pub idle_timeout: u64,
    pub server_shutdown: u64,
}

impl ClosedMetrics {
    pub fn total(&self) -> u64 {
        self.peer_disconnected + self.closed_by_participant + self.idle_timeout + self.server_shutdown
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationMetrics {
    pub relayed: u64,
    pub provider_errors: u64,
    pub partial_deliveries: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub received: u64,
    pub sent: u64,
    pub malformed: u64,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub environment: String,
    pub uptime_secs: u64,
    pub live_sessions: usize,
    pub connections: u64,
}
