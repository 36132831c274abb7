use async_trait::async_trait;

use super::{ProviderError, TranslationProvider, TranslationRequest};

/// Offline provider for local development: tags the text with the target
/// language instead of translating it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoTranslationProvider;

#[async_trait]
impl TranslationProvider for EchoTranslationProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn translate(&self, request: &TranslationRequest) -> Result<String, ProviderError> {
        Ok(format!("[{}] {}", request.target, request.text))
    }
}
