use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

pub const DEFAULT_MAX_TOKENS: i64 = 512;
pub const DEFAULT_DOCUMENT_MAX_TOKENS: i64 = 1024;
pub const MAX_TOKENS_LIMIT: i64 = 4096;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_P: f64 = 0.9;
pub const DEFAULT_TOP_K: i64 = 40;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: i64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_top_k")]
    pub top_k: i64,
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub model: Option<String>,
}

fn default_max_tokens() -> i64 {
    DEFAULT_MAX_TOKENS
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_top_p() -> f64 {
    DEFAULT_TOP_P
}

fn default_top_k() -> i64 {
    DEFAULT_TOP_K
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Result<Self, ServiceError> {
        let request = Self {
            prompt: prompt.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
            stop_sequences: None,
            stream: false,
            model: None,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.prompt.trim().is_empty() {
            return Err(ServiceError::Validation("Prompt cannot be empty".into()));
        }
        SamplingParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
        }
        .validate()
    }

    pub fn requested_model(&self) -> Option<&str> {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

struct SamplingParams {
    max_tokens: i64,
    temperature: f64,
    top_p: f64,
    top_k: i64,
}

impl SamplingParams {
    fn validate(&self) -> Result<(), ServiceError> {
        if !(1..=MAX_TOKENS_LIMIT).contains(&self.max_tokens) {
            return Err(ServiceError::Validation(format!(
                "max_tokens must be between 1 and {MAX_TOKENS_LIMIT}, got {}",
                self.max_tokens
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ServiceError::Validation(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(ServiceError::Validation(format!(
                "top_p must be between 0.0 and 1.0, got {}",
                self.top_p
            )));
        }
        if self.top_k < 0 {
            return Err(ServiceError::Validation(format!(
                "top_k must be non-negative, got {}",
                self.top_k
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Length,
    Stop,
    Complete,
    Other,
}

impl FinishReason {
    pub fn from_backend(reason: Option<&str>) -> Self {
        match reason {
            None | Some("") => FinishReason::Complete,
            Some("length") => FinishReason::Length,
            Some("stop") => FinishReason::Stop,
            Some("complete") => FinishReason::Complete,
            Some(_) => FinishReason::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub generated_text: String,
    pub prompt: String,
    pub model_used: String,
    pub tokens_generated: u64,
    pub finish_reason: FinishReason,
    pub generation_time_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub model_loaded: bool,
    pub model_info: Option<ModelInfo>,
}

impl HealthStatus {
    pub fn unhealthy() -> Self {
        Self {
            status: HealthState::Unhealthy,
            model_loaded: false,
            model_info: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub provider: String,
    pub model_name: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    #[default]
    Full,
    Summary,
    Smart,
}

impl FromStr for ContextMode {
    type Err = ServiceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "" | "full" => Ok(ContextMode::Full),
            "summary" => Ok(ContextMode::Summary),
            "smart" => Ok(ContextMode::Smart),
            other => Err(ServiceError::Validation(format!(
                "context_mode must be one of 'full', 'summary', 'smart', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuestion {
    pub question: String,
    pub max_tokens: i64,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: i64,
    pub stop_sequences: Option<Vec<String>>,
    pub model: Option<String>,
    pub context_mode: ContextMode,
}

impl DocumentQuestion {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            max_tokens: DEFAULT_DOCUMENT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
            stop_sequences: None,
            model: None,
            context_mode: ContextMode::Full,
        }
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.question.trim().is_empty() {
            return Err(ServiceError::Validation("Question cannot be empty".into()));
        }
        SamplingParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
        }
        .validate()
    }

    pub fn into_generation_request(self, prompt: String) -> GenerationRequest {
        GenerationRequest {
            prompt,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            stop_sequences: self.stop_sequences,
            stream: false,
            model: self.model,
        }
    }
}
