use std::{collections::VecDeque, sync::Arc, time::Duration, time::Instant};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use reqwest::Client;
use tracing::{debug, info, warn};

use super::{
    FragmentStream, LlmProvider,
    wire::{GeneratePayload, GenerateResponse, LineDecoder, TagsResponse, parse_stream_line},
};
use crate::{
    error::{BackendError, OLLAMA_PROVIDER, ServiceError},
    model::{FinishReason, GenerationRequest, GenerationResult, ModelInfo, resolver::CatalogEntry},
};

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, ServiceError> {
        // Streams may run indefinitely; only connect and the gap between reads are bounded.
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Internal(format!("failed to create HTTP client: {e}")))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        info!(model, base_url = %base_url, timeout_secs = timeout.as_secs(), "Ollama client initialized");

        Ok(Self {
            client,
            base_url,
            model: model.to_string(),
            timeout,
        })
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url)
    }

    async fn post_generate(
        &self,
        request: &GenerationRequest,
        stream: bool,
    ) -> Result<reqwest::Response, BackendError> {
        let payload = GeneratePayload::new(&self.model, request, stream);
        let mut builder = self.client.post(self.generate_url()).json(&payload);
        if !stream {
            builder = builder.timeout(self.timeout);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %body, "Ollama generate returned an error status");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for OllamaClient {
    fn provider_id(&self) -> &str {
        OLLAMA_PROVIDER
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: OLLAMA_PROVIDER.to_string(),
            model_name: self.model.clone(),
            base_url: self.base_url.clone(),
        }
    }

    fn with_model(&self, model: &str) -> Arc<dyn LlmProvider> {
        Arc::new(Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            model: model.to_string(),
            timeout: self.timeout,
        })
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, BackendError> {
        debug!(model = %self.model, prompt_len = request.prompt.len(), max_tokens = request.max_tokens, "invoking Ollama generate");
        let start = Instant::now();

        let response = self.post_generate(request, false).await?;
        let data: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(format!("failed to parse Ollama response: {e}")))?;

        let generation_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        let tokens_generated = data.eval_count.unwrap_or(0);
        info!(
            model = %self.model,
            tokens = tokens_generated,
            elapsed_ms = format!("{generation_time_ms:.2}"),
            "Ollama generation finished"
        );

        Ok(GenerationResult {
            generated_text: data.response,
            prompt: request.prompt.clone(),
            model_used: self.model.clone(),
            tokens_generated,
            finish_reason: FinishReason::from_backend(data.done_reason.as_deref()),
            generation_time_ms,
        })
    }

    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<FragmentStream, BackendError> {
        debug!(model = %self.model, "opening Ollama generation stream");
        let response = self.post_generate(request, true).await?;
        Ok(fragments(response.bytes_stream().boxed()))
    }

    async fn list_models(&self) -> Result<Vec<CatalogEntry>, BackendError> {
        let response = self
            .client
            .get(self.tags_url())
            .timeout(self.timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(format!("failed to parse model list: {e}")))?;
        debug!(count = tags.models.len(), "Ollama model catalog fetched");
        Ok(tags.models)
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.tags_url())
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(error = %err, "Ollama health check failed");
                false
            }
        }
    }
}

struct StreamState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: LineDecoder,
    pending: VecDeque<String>,
    body_done: bool,
    finished: bool,
}

fn fragments(body: BoxStream<'static, reqwest::Result<Bytes>>) -> FragmentStream {
    let state = StreamState {
        body,
        decoder: LineDecoder::default(),
        pending: VecDeque::new(),
        body_done: false,
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            if let Some(line) = state.pending.pop_front() {
                let chunk = match parse_stream_line(&line) {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        state.finished = true;
                        return Some((Err(err), state));
                    }
                };
                if let Some(message) = chunk.error {
                    state.finished = true;
                    return Some((Err(BackendError::Stream(message)), state));
                }
                if chunk.done {
                    state.finished = true;
                }
                match chunk.response {
                    Some(text) if !text.is_empty() => return Some((Ok(text), state)),
                    _ => continue,
                }
            }

            if state.body_done {
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => state.pending.extend(state.decoder.push(&bytes)),
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(BackendError::Transport(err)), state));
                }
                None => {
                    state.body_done = true;
                    state.pending.extend(state.decoder.finish());
                }
            }
        }
    })
    .boxed()
}
