mod ollama;
pub mod wire;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{
    config::AppConfig,
    error::{BackendError, OLLAMA_PROVIDER, ServiceError},
    model::{GenerationRequest, GenerationResult, ModelInfo, resolver, resolver::CatalogEntry},
};

pub use ollama::OllamaClient;

/// Lazily produced text fragments of one streamed generation.
///
/// Dropping the stream releases the backend connection.
pub type FragmentStream = BoxStream<'static, Result<String, BackendError>>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_id(&self) -> &str;

    fn model_name(&self) -> &str;

    fn model_info(&self) -> ModelInfo;

    fn with_model(&self, model: &str) -> Arc<dyn LlmProvider>;

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, BackendError>;

    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<FragmentStream, BackendError>;

    async fn list_models(&self) -> Result<Vec<CatalogEntry>, BackendError>;

    async fn health_check(&self) -> bool;

    async fn model_exists(&self, model: &str) -> bool {
        match self.list_models().await {
            Ok(catalog) => resolver::exists(model, &catalog),
            Err(err) => {
                tracing::warn!(model, error = %err, "model listing failed, treating model as absent");
                false
            }
        }
    }
}

pub fn build_provider(config: &AppConfig) -> Result<Arc<dyn LlmProvider>, ServiceError> {
    match config.model_type.as_str() {
        OLLAMA_PROVIDER => {
            let client = OllamaClient::new(
                &config.ollama_base_url,
                &config.model_name,
                config.request_timeout,
            )?;
            Ok(Arc::new(client))
        }
        other => Err(ServiceError::UnsupportedProvider(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_type_is_rejected() {
        let config = AppConfig {
            model_type: "llamacpp".into(),
            ..AppConfig::default()
        };
        assert!(matches!(
            build_provider(&config),
            Err(ServiceError::UnsupportedProvider(name)) if name == "llamacpp"
        ));
    }

    #[test]
    fn ollama_provider_is_bound_to_configured_model() {
        let provider = build_provider(&AppConfig::default()).unwrap();
        assert_eq!(provider.provider_id(), "ollama");
        assert_eq!(provider.model_name(), "llama2");
        assert_eq!(provider.model_info().base_url, "http://localhost:11434");
    }
}
