use std::{convert::Infallible, sync::Arc};

use axum::{
    Json, Router,
    body::Body,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::json;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use crate::{
    config::AppConfig,
    document::{DocumentExtractor, DocumentService},
    error::ServiceError,
    generation::GenerationService,
    model::{
        ContextMode, DocumentQuestion, GenerationRequest, GenerationResult, HealthStatus,
        ModelInfo, ProviderRegistry,
    },
    relay,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub generation: GenerationService,
    pub documents: DocumentService,
}

pub fn build_router(
    config: Arc<AppConfig>,
    registry: ProviderRegistry,
    extractor: Arc<dyn DocumentExtractor>,
) -> Router {
    let generation = GenerationService::new(registry);
    let state = AppState {
        documents: DocumentService::new(generation.clone(), extractor),
        generation,
        config: config.clone(),
    };

    let api = Router::new()
        .route("/generate", post(generate))
        .route("/generate/stream", post(generate_stream))
        .route("/health", get(health))
        .route("/model/info", get(model_info))
        .route(
            "/document/question",
            post(document_question).layer(DefaultBodyLimit::max(config.max_upload_bytes)),
        );

    let router = if config.api_prefix.is_empty() {
        Router::new().route("/", get(root)).merge(api)
    } else {
        Router::new()
            .route("/", get(root))
            .nest(&config.api_prefix, api)
    };

    let router = router.with_state(state);
    let router = if config.cors_enabled {
        router.layer(cors_layer(&config))
    } else {
        router
    };
    router.layer(TraceLayer::new_for_http())
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origin = if config.cors_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn root(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "message": state.config.api_title,
        "version": state.config.api_version,
        "health": format!("{}/health", state.config.api_prefix),
    }))
}

async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Json<GenerationResult>, ServiceError> {
    let Json(request) = payload.map_err(|e| ServiceError::Validation(e.body_text()))?;
    info!(
        model = request.model.as_deref().unwrap_or("default"),
        "received generate request"
    );

    if request.stream {
        return Err(ServiceError::Validation(
            "Use /generate/stream endpoint for streaming responses".into(),
        ));
    }

    let result = state.generation.generate(&request).await?;
    Ok(Json(result))
}

async fn generate_stream(
    State(state): State<AppState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let Json(request) = payload.map_err(|e| ServiceError::Validation(e.body_text()))?;
    info!(
        model = request.model.as_deref().unwrap_or("default"),
        "received streaming generate request"
    );

    let events = state.generation.generate_stream(request)?;
    let frames = relay::sse_frames(events).map(|frame| Ok::<_, Infallible>(Bytes::from(frame)));

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames),
    )
        .into_response())
}

async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    let status = state.generation.health().await;
    info!(status = ?status.status, "health check");
    Json(status)
}

async fn model_info(State(state): State<AppState>) -> Json<ModelInfo> {
    let info = state.generation.model_info();
    debug!(model = %info.model_name, "model info requested");
    Json(info)
}

async fn document_question(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<GenerationResult>, ServiceError> {
    let mut multipart = multipart.map_err(|e| ServiceError::Validation(e.body_text()))?;
    let mut form = DocumentForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("invalid multipart body", e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            form.filename = field.file_name().map(str::to_string);
            let content = field
                .bytes()
                .await
                .map_err(|e| multipart_error("failed to read upload", e))?;
            form.content = Some(content);
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| multipart_error(&format!("invalid field '{name}'"), e))?;
            form.set(&name, value)?;
        }
    }

    let (question, filename, content) = form.into_parts()?;
    let preview: String = question.question.chars().take(50).collect();
    info!(file = %filename, question = %preview, "received document question");

    let result = state.documents.answer(question, &filename, content).await?;
    info!(file = %filename, tokens = result.tokens_generated, "document question answered");
    Ok(Json(result))
}

fn multipart_error(context: &str, err: MultipartError) -> ServiceError {
    let message = format!("{context}: {}", err.body_text());
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::PayloadTooLarge(message)
    } else {
        ServiceError::Validation(message)
    }
}

#[derive(Default)]
struct DocumentForm {
    filename: Option<String>,
    content: Option<Bytes>,
    question: Option<String>,
    max_tokens: Option<i64>,
    temperature: Option<f64>,
    top_p: Option<f64>,
    top_k: Option<i64>,
    stop_sequences: Vec<String>,
    model: Option<String>,
    context_mode: Option<ContextMode>,
}

impl DocumentForm {
    fn set(&mut self, name: &str, value: String) -> Result<(), ServiceError> {
        match name {
            "question" => self.question = Some(value),
            "max_tokens" => self.max_tokens = Some(parse_field(name, &value)?),
            "temperature" => self.temperature = Some(parse_field(name, &value)?),
            "top_p" => self.top_p = Some(parse_field(name, &value)?),
            "top_k" => self.top_k = Some(parse_field(name, &value)?),
            "stop_sequences" => self.stop_sequences.push(value),
            "model" => self.model = Some(value).filter(|m| !m.trim().is_empty()),
            "context_mode" => self.context_mode = Some(value.parse()?),
            other => debug!(field = other, "ignoring unknown form field"),
        }
        Ok(())
    }

    fn into_parts(self) -> Result<(DocumentQuestion, String, Bytes), ServiceError> {
        let content = self
            .content
            .ok_or_else(|| ServiceError::Validation("file is required".into()))?;
        let question = self
            .question
            .ok_or_else(|| ServiceError::Validation("question is required".into()))?;

        let mut parsed = DocumentQuestion::new(question);
        if let Some(max_tokens) = self.max_tokens {
            parsed.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            parsed.temperature = temperature;
        }
        if let Some(top_p) = self.top_p {
            parsed.top_p = top_p;
        }
        if let Some(top_k) = self.top_k {
            parsed.top_k = top_k;
        }
        if !self.stop_sequences.is_empty() {
            parsed.stop_sequences = Some(self.stop_sequences);
        }
        parsed.model = self.model;
        parsed.context_mode = self.context_mode.unwrap_or_default();

        Ok((parsed, self.filename.unwrap_or_default(), content))
    }
}

fn parse_field<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ServiceError> {
    value
        .trim()
        .parse()
        .map_err(|_| ServiceError::Validation(format!("invalid value for '{name}': '{value}'")))
}
