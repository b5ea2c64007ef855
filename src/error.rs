use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

pub const OLLAMA_PROVIDER: &str = "ollama";
pub const OLLAMA_LIBRARY_URL: &str = "https://ollama.ai/library";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid backend payload: {0}")]
    Decode(String),
    #[error("backend reported an error: {0}")]
    Stream(String),
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Only PDF files are supported. Please upload a .pdf file.")]
    UnsupportedFormat(String),
    #[error("Uploaded file is empty")]
    EmptyDocument,
    #[error("Failed to process PDF: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelNotFound {
    pub model_name: String,
    pub provider: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModelNotFoundBody {
    pub error: &'static str,
    pub model_name: String,
    pub provider: String,
    pub message: String,
    pub instructions: Instructions,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Instructions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_models_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browse_models_url: Option<String>,
}

impl ModelNotFound {
    pub fn new(model_name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            provider: provider.into(),
        }
    }

    pub fn message(&self) -> String {
        if self.provider == OLLAMA_PROVIDER {
            format!(
                "Model '{name}' not found. To download this model, run:\n\n  ollama pull {name}\n\nTo see available models, run:\n  ollama list\n\nFor more models, visit: {OLLAMA_LIBRARY_URL}",
                name = self.model_name
            )
        } else {
            format!(
                "Model '{}' not found for provider '{}'",
                self.model_name, self.provider
            )
        }
    }

    pub fn instructions(&self) -> Instructions {
        if self.provider != OLLAMA_PROVIDER {
            return Instructions::default();
        }
        Instructions {
            download_command: Some(format!("ollama pull {}", self.model_name)),
            list_models_command: Some("ollama list".to_string()),
            browse_models_url: Some(OLLAMA_LIBRARY_URL.to_string()),
        }
    }

    pub fn to_body(&self) -> ModelNotFoundBody {
        ModelNotFoundBody {
            error: "Model Not Found",
            model_name: self.model_name.clone(),
            provider: self.provider.clone(),
            message: self.message(),
            instructions: self.instructions(),
        }
    }
}

impl std::fmt::Display for ModelNotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "model '{}' not found", self.model_name)
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    ModelNotFound(ModelNotFound),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("Failed to generate text: {0}")]
    Backend(#[from] BackendError),
    #[error("unsupported provider type: {0}")]
    UnsupportedProvider(String),
    #[error("{0}")]
    Internal(String),
}

impl From<ModelNotFound> for ServiceError {
    fn from(value: ModelNotFound) -> Self {
        ServiceError::ModelNotFound(value)
    }
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::ModelNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Extraction(ExtractionError::UnsupportedFormat(_))
            | ServiceError::Extraction(ExtractionError::EmptyDocument) => StatusCode::BAD_REQUEST,
            ServiceError::Extraction(ExtractionError::Parse(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::Backend(_)
            | ServiceError::UnsupportedProvider(_)
            | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ServiceError::ModelNotFound(missing) = &self {
            tracing::warn!(model = %missing.model_name, "model not found");
            return (status, axum::Json(missing.to_body())).into_response();
        }

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
