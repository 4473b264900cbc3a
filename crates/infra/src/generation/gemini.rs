use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::{GenerationClient, TransportError};
use crate::config::GenerationSettings;

/// Error bodies are truncated to this many characters in [`TransportError::Http`].
const MAX_ERROR_BODY: usize = 512;

/// `generateContent` client for the Gemini REST API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: &'a GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

impl GeminiClient {
    /// Build a client from settings. Fails when no API key is configured.
    pub fn from_settings(settings: &GenerationSettings) -> Result<Self, TransportError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| TransportError::Request("no API key configured".to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!(
                "{}/models/{}:generateContent",
                settings.base_url.trim_end_matches('/'),
                settings.model
            ),
            api_key,
            generation_config: GenerationConfig {
                temperature: settings.temperature,
                top_k: settings.top_k,
                top_p: settings.top_p,
            },
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, TransportError> {
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
            generation_config: &self.generation_config,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("X-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let envelope: JsonValue = response
            .json()
            .await
            .map_err(|e| TransportError::MalformedEnvelope(e.to_string()))?;

        envelope
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                TransportError::MalformedEnvelope("missing candidates[0].content.parts[0].text".to_string())
            })
    }
}
