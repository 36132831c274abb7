use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ProviderError, TranslationProvider, TranslationRequest};

/// Longest upstream error body we keep for the error message.
const MAX_ERROR_BODY: usize = 200;

/// Client for a LibreTranslate-compatible `POST /translate` endpoint.
pub struct HttpTranslationProvider {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Serialize)]
struct TranslateBody<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
}

impl HttpTranslationProvider {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build translation HTTP client")?;
        Ok(Self {
            client,
            url: format!("{}/translate", endpoint.trim_end_matches('/')),
            api_key,
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TranslationProvider for HttpTranslationProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn translate(&self, request: &TranslationRequest) -> Result<String, ProviderError> {
        let body = TranslateBody {
            q: &request.text,
            source: request.source.as_str(),
            target: request.target.as_str(),
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout)
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::Quota);
        }
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        debug!(
            source = %request.source,
            target = %request.target,
            chars = parsed.translated_text.len(),
            "Provider returned translation"
        );
        Ok(parsed.translated_text)
    }
}
