use serde::{Deserialize, Serialize};

use crate::{error::BackendError, model::GenerationRequest, model::resolver::CatalogEntry};

#[derive(Debug, Serialize)]
pub struct GeneratePayload<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub stream: bool,
    pub options: GenerateOptions<'a>,
}

#[derive(Debug, Serialize)]
pub struct GenerateOptions<'a> {
    pub num_predict: i64,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<&'a [String]>,
}

impl<'a> GeneratePayload<'a> {
    pub fn new(model: &'a str, request: &'a GenerationRequest, stream: bool) -> Self {
        let stop = request
            .stop_sequences
            .as_deref()
            .filter(|stops| !stops.is_empty());
        Self {
            model,
            prompt: &request.prompt,
            stream,
            options: GenerateOptions {
                num_predict: request.max_tokens,
                temperature: request.temperature,
                top_p: request.top_p,
                top_k: request.top_k,
                stop,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub eval_count: Option<u64>,
    #[serde(default)]
    pub done_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamChunk {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<CatalogEntry>,
}

#[derive(Debug, Default)]
pub struct LineDecoder {
    partial: Vec<u8>,
}

impl LineDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\n' {
                let raw = std::mem::take(&mut self.partial);
                if let Some(line) = non_empty_line(&raw) {
                    lines.push(line);
                }
            } else {
                self.partial.push(byte);
            }
        }
        lines
    }

    pub fn finish(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.partial);
        non_empty_line(&raw)
    }
}

fn non_empty_line(raw: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

pub fn parse_stream_line(line: &str) -> Result<StreamChunk, BackendError> {
    serde_json::from_str(line)
        .map_err(|e| BackendError::Decode(format!("malformed stream line: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_matches_backend_contract() {
        let mut request = GenerationRequest::new("Why is the sky blue?").unwrap();
        request.stop_sequences = Some(vec!["\n\n".into()]);
        let value = serde_json::to_value(GeneratePayload::new("llama2", &request, true)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "model": "llama2",
                "prompt": "Why is the sky blue?",
                "stream": true,
                "options": {
                    "num_predict": 512,
                    "temperature": 0.7,
                    "top_p": 0.9,
                    "top_k": 40,
                    "stop": ["\n\n"]
                }
            })
        );
    }

    #[test]
    fn empty_stop_list_is_omitted() {
        let mut request = GenerationRequest::new("p").unwrap();
        request.stop_sequences = Some(Vec::new());
        let value = serde_json::to_value(GeneratePayload::new("m", &request, false)).unwrap();
        assert!(value["options"].get("stop").is_none());
    }

    #[test]
    fn decoder_handles_lines_split_across_chunks() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.push(b"{\"response\":\"He").is_empty());
        let lines = decoder.push(b"llo\"}\n\n{\"response\":\" world\"}\n{\"done\"");
        assert_eq!(
            lines,
            vec![
                "{\"response\":\"Hello\"}".to_string(),
                "{\"response\":\" world\"}".to_string()
            ]
        );
        assert_eq!(decoder.push(b":true}"), Vec::<String>::new());
        assert_eq!(decoder.finish().as_deref(), Some("{\"done\":true}"));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn stream_line_parsing() {
        let chunk = parse_stream_line(r#"{"model":"m","response":"Hi","done":false}"#).unwrap();
        assert_eq!(chunk.response.as_deref(), Some("Hi"));
        assert!(!chunk.done);

        let chunk = parse_stream_line(r#"{"error":"model crashed"}"#).unwrap();
        assert_eq!(chunk.error.as_deref(), Some("model crashed"));

        assert!(matches!(
            parse_stream_line("not json"),
            Err(BackendError::Decode(_))
        ));
    }
}
