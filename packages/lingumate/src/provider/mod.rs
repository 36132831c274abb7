//! Translation Provider Adapter.
//!
//! The relay never talks to a translation backend directly; it goes through
//! [`TranslationProvider`] so backends can be swapped (and faked in tests).

mod echo;
mod http;

pub use echo::EchoTranslationProvider;
pub use http::HttpTranslationProvider;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lingumate_protocol::LanguageTag;

use crate::config::{ProviderConfig, ProviderKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub text: String,
    pub source: LanguageTag,
    pub target: LanguageTag,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("translation provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("translation quota exceeded")]
    Quota,

    #[error("translation provider unreachable: {0}")]
    Network(String),

    #[error("translation provider returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("unexpected translation provider response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait TranslationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn translate(&self, request: &TranslationRequest) -> Result<String, ProviderError>;
}

/// Run one provider call under `deadline`. An elapsed deadline drops the
/// in-flight call and reports [`ProviderError::Timeout`].
pub async fn translate_with_deadline(
    provider: &dyn TranslationProvider,
    request: &TranslationRequest,
    deadline: Duration,
) -> Result<String, ProviderError> {
    tokio::time::timeout(deadline, provider.translate(request))
        .await
        .map_err(|_| ProviderError::Timeout(deadline))?
}

pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn TranslationProvider>> {
    match config.kind {
        ProviderKind::Echo => Ok(Arc::new(EchoTranslationProvider)),
        ProviderKind::Http => {
            let endpoint = config
                .endpoint
                .as_deref()
                .context("provider.endpoint is required for the http provider")?;
            let provider =
                HttpTranslationProvider::new(endpoint, config.api_key.clone(), config.timeout)?;
            Ok(Arc::new(provider))
        }
    }
}
