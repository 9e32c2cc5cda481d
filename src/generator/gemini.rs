/// Google Gemini `generateContent` client.
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{GenerationError, Generator};
use crate::config::GeneratorConfig;

pub struct GeminiGenerator {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl GeminiGenerator {
    /// Build a client from config, reading the API key from the configured
    /// environment variable. A missing key only fails at call time.
    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!(
                "{} is not set; queries will fail until it is provided",
                config.api_key_env
            );
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint(&config.base_url, &config.model),
            api_key,
        })
    }
}

fn endpoint(base_url: &str, model: &str) -> String {
    format!(
        "{}/models/{model}:generateContent",
        base_url.trim_end_matches('/')
    )
}

fn request_body(prompt: &str) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": prompt }] }]
    })
}

/// Map a non-success HTTP status onto the error taxonomy.
fn classify_status(status: StatusCode, body: &str) -> GenerationError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => GenerationError::Quota(message),
        _ => GenerationError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(payload: &Value) -> Result<String, GenerationError> {
    let text: String = payload["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();

    if !text.is_empty() {
        return Ok(text);
    }

    let reason = payload["promptFeedback"]["blockReason"]
        .as_str()
        .or_else(|| payload["candidates"][0]["finishReason"].as_str())
        .unwrap_or("no candidates");
    Err(GenerationError::InvalidResponse(reason.to_string()))
}

impl Generator for GeminiGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| GenerationError::Auth("API key not configured".to_string()))?;

        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", api_key)
            .json(&request_body(prompt))
            .send()
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| GenerationError::Network(e.to_string()))?;
        debug!("generator responded {status} ({} bytes)", body.len());

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let payload: Value = serde_json::from_str(&body)
            .map_err(|e| GenerationError::InvalidResponse(format!("malformed JSON: {e}")))?;
        extract_text(&payload)
    }
}
