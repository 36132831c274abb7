use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// =============================================================================
// File config (figment-deserialized from defaults / lingumate.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   lingumate.toml:  [session]
//                    idle_timeout_secs = 600
//
//   env var:         LINGUMATE_SESSION__IDLE_TIMEOUT_SECS=600   (double underscore = nesting)
//
//   legacy env var:  HANDSHAKE_PORT=3001 / REALTIME_TRANSLATION_PORT=3002

pub const CONFIG_FILE_NAME: &str = "lingumate.toml";

/// Which translation backend the relay calls.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Offline stand-in that tags text with the target language
    Echo,
    /// LibreTranslate-compatible HTTP API
    Http,
}

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub session: SessionFileConfig,
    #[serde(default)]
    pub relay: RelayFileConfig,
    #[serde(default)]
    pub provider: ProviderFileConfig,
    #[serde(default)]
    pub audit: AuditFileConfig,
}

/// Listener settings (lives under `[server]` in lingumate.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_handshake_port")]
    pub handshake_port: u16,
    #[serde(default = "default_relay_port")]
    pub relay_port: u16,
    /// Reported by `/health`.
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            handshake_port: default_handshake_port(),
            relay_port: default_relay_port(),
            environment: default_environment(),
        }
    }
}

/// Session lifecycle knobs (lives under `[session]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionFileConfig {
    /// Close sessions with no relayed activity for this long. 0 disables.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
    /// Per-connection outbound frame queue.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            reap_interval_secs: default_reap_interval_secs(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

/// Relay fan-out knobs (lives under `[relay]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayFileConfig {
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
}

impl Default for RelayFileConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: default_delivery_timeout_ms(),
        }
    }
}

/// Translation backend (lives under `[provider]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderFileConfig {
    #[serde(default = "default_provider_kind")]
    pub kind: ProviderKind,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderFileConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            endpoint: None,
            api_key: None,
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

/// Optional audit log (lives under `[audit]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditFileConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Relative paths resolve against the data directory.
    #[serde(default = "default_audit_db_path")]
    pub db_path: String,
}

impl Default for AuditFileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            db_path: default_audit_db_path(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_handshake_port() -> u16 {
    3001
}
fn default_relay_port() -> u16 {
    3002
}
fn default_environment() -> String {
    "development".to_string()
}
fn default_idle_timeout_secs() -> u64 {
    900
}
fn default_reap_interval_secs() -> u64 {
    30
}
fn default_outbound_queue() -> usize {
    64
}
fn default_delivery_timeout_ms() -> u64 {
    5000
}
fn default_provider_kind() -> ProviderKind {
    ProviderKind::Echo
}
fn default_provider_timeout_secs() -> u64 {
    30
}
fn default_audit_db_path() -> String {
    "lingumate.db".to_string()
}

/// Build a figment that layers: defaults → lingumate.toml → legacy port vars → LINGUMATE_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `LINGUMATE_PROVIDER__KIND=http`  →  `provider.kind = "http"`
///   `LINGUMATE_SERVER__RELAY_PORT=4002`  →  `server.relay_port = 4002`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join(CONFIG_FILE_NAME)))
        .merge(
            Env::raw()
                .only(&["HANDSHAKE_PORT"])
                .map(|_| "server.handshake_port".into()),
        )
        .merge(
            Env::raw()
                .only(&["REALTIME_TRANSLATION_PORT"])
                .map(|_| "server.relay_port".into()),
        )
        .merge(Env::prefixed("LINGUMATE_").split("__"))
}

// =============================================================================
// Runtime config structs (derived from FileConfig, used throughout the server)
// =============================================================================

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub relay: RelayConfig,
    pub provider: ProviderConfig,
    pub audit: AuditConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub handshake_port: u16,
    pub relay_port: u16,
    pub environment: String,
}

impl ServerConfig {
    pub fn handshake_addr(&self) -> Result<SocketAddr> {
        socket_addr(&self.host, self.handshake_port)
    }

    pub fn relay_addr(&self) -> Result<SocketAddr> {
        socket_addr(&self.host, self.relay_port)
    }
}

fn socket_addr(host: &str, port: u16) -> Result<SocketAddr> {
    format!("{host}:{port}")
        .parse::<SocketAddr>()
        .with_context(|| format!("Invalid listen address {host}:{port}"))
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// None = idle sessions are never reaped
    pub idle_timeout: Option<Duration>,
    pub reap_interval: Duration,
    pub outbound_queue: usize,
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// How long one leg of a fan-out may take before it counts as failed
    pub delivery_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct AuditConfig {
    pub enabled: bool,
    pub db_path: PathBuf,
}

impl AuditConfig {
    pub fn db_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.db_path.display())
    }
}

impl ServiceConfig {
    pub fn from_file(fc: &FileConfig, data_dir: &Path) -> Result<Self> {
        let server = &fc.server;
        if server.handshake_port != 0 && server.handshake_port == server.relay_port {
            bail!(
                "handshake and relay endpoints cannot share port {}",
                server.handshake_port
            );
        }
        if fc.provider.kind == ProviderKind::Http && fc.provider.endpoint.is_none() {
            bail!("provider.kind = \"http\" requires provider.endpoint");
        }
        if fc.provider.timeout_secs == 0 {
            bail!("provider.timeout_secs must be greater than 0");
        }
        if fc.relay.delivery_timeout_ms == 0 {
            bail!("relay.delivery_timeout_ms must be greater than 0");
        }

        let db_path = PathBuf::from(&fc.audit.db_path);
        let db_path = if db_path.is_absolute() {
            db_path
        } else {
            data_dir.join(db_path)
        };

        Ok(Self {
            server: ServerConfig {
                host: server.host.clone(),
                handshake_port: server.handshake_port,
                relay_port: server.relay_port,
                environment: server.environment.clone(),
            },
            session: SessionConfig {
                idle_timeout: if fc.session.idle_timeout_secs == 0 {
                    None
                } else {
                    Some(Duration::from_secs(fc.session.idle_timeout_secs))
                },
                reap_interval: Duration::from_secs(fc.session.reap_interval_secs.max(1)),
                outbound_queue: fc.session.outbound_queue.max(1),
            },
            relay: RelayConfig {
                delivery_timeout: Duration::from_millis(fc.relay.delivery_timeout_ms),
            },
            provider: ProviderConfig {
                kind: fc.provider.kind,
                endpoint: fc.provider.endpoint.clone(),
                api_key: fc.provider.api_key.clone(),
                timeout: Duration::from_secs(fc.provider.timeout_secs),
            },
            audit: AuditConfig {
                enabled: fc.audit.enabled,
                db_path,
            },
        })
    }
}

// =============================================================================
// Directory layout (not tunable via figment; derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct DataDir {
    pub path: PathBuf,
}

impl DataDir {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let path = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".lingumate"),
        };

        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create data directory: {:?}", path))?;

        info!("Data directory: {}", path.display());

        Ok(Self { path })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.path.join(CONFIG_FILE_NAME)
    }
}
