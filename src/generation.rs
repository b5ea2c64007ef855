use std::future;

use futures::{StreamExt, stream, stream::BoxStream};
use tracing::{debug, info};

use crate::{
    backend::LlmProvider,
    error::{ModelNotFound, ServiceError},
    model::{GenerationRequest, GenerationResult, HealthState, HealthStatus, ModelInfo, ProviderRegistry},
};

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Fragment(String),
    ModelNotFound(ModelNotFound),
    Failed(String),
}

impl StreamEvent {
    pub fn is_error(&self) -> bool {
        !matches!(self, StreamEvent::Fragment(_))
    }
}

pub type EventStream = BoxStream<'static, StreamEvent>;

#[derive(Clone)]
pub struct GenerationService {
    registry: ProviderRegistry,
}

impl GenerationService {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, ServiceError> {
        request.validate()?;
        let provider = self.registry.resolve(request.requested_model());
        ensure_model(provider.as_ref()).await?;

        let result = provider.generate(request).await?;
        info!(
            model = %result.model_used,
            tokens = result.tokens_generated,
            elapsed_ms = format!("{:.2}", result.generation_time_ms),
            "generation completed"
        );
        Ok(result)
    }

    pub fn generate_stream(&self, request: GenerationRequest) -> Result<EventStream, ServiceError> {
        request.validate()?;
        let provider = self.registry.resolve(request.requested_model());

        let opened = async move {
            if let Err(missing) = ensure_model(provider.as_ref()).await {
                return stream::iter([StreamEvent::ModelNotFound(missing)]).boxed();
            }
            debug!(model = provider.model_name(), "starting streaming generation");
            match provider.generate_stream(&request).await {
                Ok(fragments) => fragments
                    .map(|item| match item {
                        Ok(text) => StreamEvent::Fragment(text),
                        Err(err) => StreamEvent::Failed(ServiceError::from(err).to_string()),
                    })
                    .boxed(),
                Err(err) => {
                    stream::iter([StreamEvent::Failed(ServiceError::from(err).to_string())]).boxed()
                }
            }
        };

        let events = stream::once(opened)
            .flatten()
            .scan(false, |ended, event| {
                if *ended {
                    return future::ready(None);
                }
                *ended = event.is_error();
                future::ready(Some(event))
            })
            .boxed();
        Ok(events)
    }

    pub async fn health(&self) -> HealthStatus {
        let provider = self.registry.default_provider();
        if provider.health_check().await {
            HealthStatus {
                status: HealthState::Healthy,
                model_loaded: true,
                model_info: Some(provider.model_info()),
            }
        } else {
            HealthStatus::unhealthy()
        }
    }

    pub fn model_info(&self) -> ModelInfo {
        self.registry.default_provider().model_info()
    }
}

async fn ensure_model(provider: &dyn LlmProvider) -> Result<(), ModelNotFound> {
    let model = provider.model_name();
    if provider.model_exists(model).await {
        Ok(())
    } else {
        Err(ModelNotFound::new(model, provider.provider_id()))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use futures::StreamExt;

    use crate::{
        backend::{FragmentStream, LlmProvider},
        error::BackendError,
        model::{
            FinishReason, GenerationRequest, GenerationResult, ModelInfo, resolver::CatalogEntry,
        },
    };

    #[derive(Clone)]
    pub struct ScriptedProvider {
        pub model: String,
        pub catalog: Option<Vec<String>>,
        pub script: Vec<Result<String, String>>,
        pub healthy: bool,
        pub backend_calls: Arc<AtomicUsize>,
    }

    impl ScriptedProvider {
        pub fn new(model: &str, catalog: &[&str]) -> Self {
            Self {
                model: model.to_string(),
                catalog: Some(catalog.iter().map(|s| s.to_string()).collect()),
                script: Vec::new(),
                healthy: true,
                backend_calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn with_script(mut self, script: Vec<Result<&str, &str>>) -> Self {
            self.script = script
                .into_iter()
                .map(|item| item.map(str::to_string).map_err(str::to_string))
                .collect();
            self
        }

        pub fn calls(&self) -> usize {
            self.backend_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn provider_id(&self) -> &str {
            "ollama"
        }

        fn model_name(&self) -> &str {
            &self.model
        }

        fn model_info(&self) -> ModelInfo {
            ModelInfo {
                provider: "ollama".into(),
                model_name: self.model.clone(),
                base_url: "http://scripted".into(),
            }
        }

        fn with_model(&self, model: &str) -> Arc<dyn LlmProvider> {
            let mut switched = self.clone();
            switched.model = model.to_string();
            Arc::new(switched)
        }

        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> Result<GenerationResult, BackendError> {
            self.backend_calls.fetch_add(1, Ordering::SeqCst);
            let mut text = String::new();
            for item in &self.script {
                match item {
                    Ok(fragment) => text.push_str(fragment),
                    Err(message) => return Err(BackendError::Stream(message.clone())),
                }
            }
            Ok(GenerationResult {
                generated_text: text,
                prompt: request.prompt.clone(),
                model_used: self.model.clone(),
                tokens_generated: self.script.len() as u64,
                finish_reason: FinishReason::Stop,
                generation_time_ms: 1.0,
            })
        }

        async fn generate_stream(
            &self,
            _request: &GenerationRequest,
        ) -> Result<FragmentStream, BackendError> {
            self.backend_calls.fetch_add(1, Ordering::SeqCst);
            let items: Vec<Result<String, BackendError>> = self
                .script
                .iter()
                .cloned()
                .map(|item| item.map_err(BackendError::Stream))
                .collect();
            Ok(futures::stream::iter(items).boxed())
        }

        async fn list_models(&self) -> Result<Vec<CatalogEntry>, BackendError> {
            match &self.catalog {
                Some(names) => Ok(names.iter().map(|n| CatalogEntry::new(n.as_str())).collect()),
                None => Err(BackendError::Status {
                    status: 503,
                    body: "unavailable".into(),
                }),
            }
        }

        async fn health_check(&self) -> bool {
            self.healthy
        }
    }
}
