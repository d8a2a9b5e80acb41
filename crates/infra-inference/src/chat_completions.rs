// OpenAI-compatible chat completions analyzer
//
// Failure classification drives the retry policy: 408, 429, 5xx and network
// errors are transient; other 4xx and unusable bodies are permanent.

use crate::prompt::{user_prompt, SYSTEM_PROMPT};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clipscope_core::port::{Analyzer, AnalyzerError, Inference, InferenceRequest};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

const ERROR_BODY_CHARS: usize = 300;

/// Endpoint settings
#[derive(Debug, Clone)]
pub struct ChatCompletionsConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Client-side bound on one HTTP exchange
    pub request_timeout: Duration,
    /// Vision detail hint sent with every image
    pub image_detail: String,
}

impl ChatCompletionsConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            request_timeout: Duration::from_secs(120),
            image_detail: "low".to_string(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct ChatCompletionsAnalyzer {
    client: Client,
    endpoint: String,
    config: ChatCompletionsConfig,
}

impl ChatCompletionsAnalyzer {
    pub fn new(config: ChatCompletionsConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn encode_frames(&self, frames: &[PathBuf]) -> Result<Vec<String>, AnalyzerError> {
        let mut urls = Vec::with_capacity(frames.len());
        for frame in frames {
            let bytes = tokio::fs::read(frame).await.map_err(|e| {
                AnalyzerError::Permanent(format!("Cannot read frame {}: {}", frame.display(), e))
            })?;
            urls.push(format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes)));
        }
        Ok(urls)
    }

    fn build_body(&self, request: &InferenceRequest<'_>, images: Vec<String>) -> Value {
        let mut content = vec![json!({
            "type": "text",
            "text": user_prompt(request.context, images.len()),
        })];
        content.extend(images.into_iter().map(|url| {
            json!({
                "type": "image_url",
                "image_url": { "url": url, "detail": self.config.image_detail },
            })
        }));

        json!({
            "model": self.config.model,
            "max_tokens": request.token_budget,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": content },
            ],
        })
    }
}

#[async_trait]
impl Analyzer for ChatCompletionsAnalyzer {
    async fn infer(&self, request: InferenceRequest<'_>) -> Result<Inference, AnalyzerError> {
        let images = self.encode_frames(request.frames).await?;
        let body = self.build_body(&request, images);

        let mut http = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            http = http.bearer_auth(key);
        }

        debug!(
            endpoint = %self.endpoint,
            model = %self.config.model,
            frames = request.frames.len(),
            max_tokens = request.token_budget,
            "Sending inference request"
        );

        let response = http.send().await.map_err(classify_transport)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = classify_status(status, &text);
            warn!(status = status.as_u16(), transient = err.is_transient(), "Analyzer returned an error");
            return Err(err);
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            AnalyzerError::Permanent(format!("Malformed analyzer response: {}", e))
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AnalyzerError::Permanent("Analyzer returned no content".to_string()))?;

        Ok(Inference {
            text,
            usage: parsed.usage.unwrap_or(Value::Null),
        })
    }
}

fn classify_status(status: StatusCode, body: &str) -> AnalyzerError {
    let snippet: String = body.trim().chars().take(ERROR_BODY_CHARS).collect();
    let message = format!("{}: {}", status, snippet);
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        AnalyzerError::Transient(message)
    } else {
        AnalyzerError::Permanent(message)
    }
}

fn classify_transport(err: reqwest::Error) -> AnalyzerError {
    if err.is_builder() || err.is_decode() {
        AnalyzerError::Permanent(format!("Request failed: {}", err))
    } else {
        AnalyzerError::Transient(format!("Request failed: {}", err))
    }
}
