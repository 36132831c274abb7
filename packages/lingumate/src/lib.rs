//! Lingumate session engine.
//!
//! Two cooperating WebSocket services share one [`SessionRegistry`]:
//! - the handshake endpoint creates sessions and pairs participants
//! - the relay endpoint translates each utterance through a
//!   [`TranslationProvider`] and fans the result out to both participants

pub mod audit;
pub mod config;
pub mod error;
pub mod handshake;
pub mod metrics;
pub mod provider;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;
pub mod smoke;
pub mod ws;

pub use audit::{AuditSink, SqliteAuditLog};
pub use config::{DataDir, FileConfig, ServiceConfig, load_config};
pub use error::SessionError;
pub use metrics::ServerMetrics;
pub use provider::{ProviderError, TranslationProvider, TranslationRequest};
pub use registry::SessionRegistry;
pub use server::{AppState, RunningServer};
