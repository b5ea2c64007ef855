use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub api_prefix: String,
    pub api_title: String,
    pub api_version: String,
    pub model_type: String,
    pub model_name: String,
    pub ollama_base_url: String,
    pub request_timeout: Duration,
    pub cors_enabled: bool,
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8001),
            api_prefix: "/api/v1".to_string(),
            api_title: "LLM Gateway REST API".to_string(),
            api_version: "1.0.0".to_string(),
            model_type: "ollama".to_string(),
            model_name: "llama2".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            request_timeout: Duration::from_secs(300),
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let listen_addr = env::var("SERVER_ADDR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.listen_addr);

        let api_prefix = env::var("API_PREFIX")
            .map(|v| normalize_prefix(&v))
            .unwrap_or(defaults.api_prefix);
        let api_title = env::var("API_TITLE").unwrap_or(defaults.api_title);
        let api_version = env::var("API_VERSION").unwrap_or(defaults.api_version);

        let model_type = env::var("MODEL_TYPE")
            .map(|v| v.to_lowercase())
            .unwrap_or(defaults.model_type);
        let model_name = env::var("MODEL_NAME").unwrap_or(defaults.model_name);
        let ollama_base_url = env::var("OLLAMA_BASE_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or(defaults.ollama_base_url);

        let request_timeout = env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs: &u64| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        let cors_enabled = env::var("CORS_ENABLED")
            .ok()
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.cors_enabled);
        let cors_origins = env::var("CORS_ORIGINS")
            .ok()
            .map(|v| parse_list(&v))
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.cors_origins);

        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_upload_bytes);

        Ok(Self {
            listen_addr,
            api_prefix,
            api_title,
            api_version,
            model_type,
            model_name,
            ollama_base_url,
            request_timeout,
            cors_enabled,
            cors_origins,
            max_upload_bytes,
        })
    }
}

fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
