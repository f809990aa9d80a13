//! Classification collaborator abstraction and implementations.
//!
//! Defines the [`Classifier`] trait and concrete backends:
//! - **[`DisabledClassifier`]**: every call fails; used when no model is configured.
//! - **[`GeminiClassifier`]**: Google Gemini `generateContent` with a response schema.
//! - **[`OpenAiClassifier`]**: OpenAI-compatible chat completions with `json_schema` output.
//! - **[`OllamaClassifier`]**: a local Ollama instance's `/api/chat` with `format` set to the schema.
//!
//! A classifier accepts `(instructions, payload, expected_shape)` and returns
//! the raw response text, which the calling stage parses and validates. No
//! validation happens here.
//!
//! # Provider Selection
//!
//! ```rust
//! # use notesort::config::ClassifierConfig;
//! # use notesort::classifier::create_classifier;
//! let config = ClassifierConfig::default(); // provider = "disabled"
//! let classifier = create_classifier(&config).unwrap();
//! assert_eq!(classifier.name(), "disabled");
//! ```
//!
//! # Retry Strategy
//!
//! The HTTP backends use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Exhausted retries surface as [`PipelineError::CollaboratorUnavailable`].

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::ClassifierConfig;
use crate::error::{PipelineError, Result};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// The external text-classification capability.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Backend identifier used in logs (e.g. `"gemini"`).
    fn name(&self) -> &str;

    /// Run one classification call and return the raw response text.
    ///
    /// The text is expected, but not guaranteed, to be JSON matching
    /// `expected_shape`.
    async fn invoke(
        &self,
        instructions: &str,
        payload: &str,
        expected_shape: &Value,
    ) -> Result<String>;
}

/// Create the configured classifier.
///
/// # Supported Providers
///
/// | Config Value | Classifier |
/// |-------------|------------|
/// | `"disabled"` | [`DisabledClassifier`] |
/// | `"gemini"` | [`GeminiClassifier`] |
/// | `"openai"` | [`OpenAiClassifier`] |
/// | `"ollama"` | [`OllamaClassifier`] |
pub fn create_classifier(config: &ClassifierConfig) -> Result<Arc<dyn Classifier>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledClassifier)),
        "gemini" => Ok(Arc::new(GeminiClassifier::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiClassifier::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaClassifier::new(config)?)),
        other => Err(PipelineError::Config(format!(
            "Unknown classifier provider: {}",
            other
        ))),
    }
}

// ============ Disabled ============

/// A classifier that refuses every call.
pub struct DisabledClassifier;

#[async_trait]
impl Classifier for DisabledClassifier {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn invoke(&self, _: &str, _: &str, _: &Value) -> Result<String> {
        Err(PipelineError::CollaboratorUnavailable(
            "classifier provider is disabled; set [classifier].provider in the config".to_string(),
        ))
    }
}

// ============ Shared HTTP plumbing ============

/// HTTP client plus the retry policy shared by the remote backends.
struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_retries: u32,
}

impl HttpTransport {
    fn new(config: &ClassifierConfig, default_base: &str) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            PipelineError::Config(format!(
                "classifier.model required for {} provider",
                config.provider
            ))
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Config(format!("cannot build HTTP client: {e}")))?;
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(default_base)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            base_url,
            model,
            max_retries: config.max_retries,
        })
    }

    /// POST `body` to `url`, retrying transient failures.
    async fn post_json(
        &self,
        backend: &str,
        url: &str,
        headers: &[(&str, String)],
        body: &Value,
    ) -> Result<Value> {
        let start = Instant::now();
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(backend, attempt, delay_secs = delay.as_secs(), "retrying classifier call");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(url).json(body);
            for (name, value) in headers {
                request = request.header(*name, value);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: Value = response.json().await.map_err(|e| {
                            PipelineError::CollaboratorUnavailable(format!(
                                "{} returned an unreadable body: {}",
                                backend, e
                            ))
                        })?;
                        debug!(
                            backend,
                            duration_ms = start.elapsed().as_millis() as u64,
                            "classifier call complete"
                        );
                        return Ok(json);
                    }

                    let body_text = response.text().await.unwrap_or_default();

                    // Rate limited or server error, retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(backend, %status, attempt, "transient classifier error");
                        last_err = Some(format!("{} API error {}: {}", backend, status, body_text));
                        continue;
                    }

                    // Client error (not 429), don't retry
                    return Err(PipelineError::CollaboratorUnavailable(format!(
                        "{} API error {}: {}",
                        backend, status, body_text
                    )));
                }
                Err(e) => {
                    warn!(backend, attempt, error = %e, "classifier request failed");
                    last_err = Some(format!("{} request failed: {}", backend, e));
                }
            }
        }

        Err(PipelineError::CollaboratorUnavailable(last_err.unwrap_or_else(
            || format!("{} call failed after retries", backend),
        )))
    }
}

fn missing_text(backend: &str, what: &str) -> PipelineError {
    PipelineError::CollaboratorUnavailable(format!("{} response missing {}", backend, what))
}

// ============ Gemini ============

/// Google Gemini via the `generateContent` REST endpoint.
///
/// Reads the key from `GEMINI_API_KEY`, falling back to `API_KEY`.
pub struct GeminiClassifier {
    http: HttpTransport,
    api_key: String,
}

impl GeminiClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .map_err(|_| {
                PipelineError::Config("GEMINI_API_KEY environment variable not set".to_string())
            })?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &ClassifierConfig, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: HttpTransport::new(config, GEMINI_BASE_URL)?,
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn invoke(
        &self,
        instructions: &str,
        payload: &str,
        expected_shape: &Value,
    ) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.http.base_url, self.http.model
        );
        let body = json!({
            "systemInstruction": { "parts": [{ "text": instructions }] },
            "contents": [{ "role": "user", "parts": [{ "text": payload }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": gemini_schema(expected_shape),
            }
        });
        let headers = [("x-goog-api-key", self.api_key.clone())];

        let json = self.http.post_json("gemini", &url, &headers, &body).await?;
        let parts = json
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .ok_or_else(|| missing_text("gemini", "candidates[0].content.parts"))?;

        Ok(parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect())
    }
}

/// Gemini spells schema types in upper case (`OBJECT`, `STRING`, ...).
fn gemini_schema(shape: &Value) -> Value {
    match shape {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| match (k.as_str(), v) {
                    ("type", Value::String(t)) => (k.clone(), Value::String(t.to_uppercase())),
                    _ => (k.clone(), gemini_schema(v)),
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(gemini_schema).collect()),
        other => other.clone(),
    }
}

// ============ OpenAI ============

/// OpenAI (or any compatible server) via `POST /v1/chat/completions`.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiClassifier {
    http: HttpTransport,
    api_key: String,
}

impl OpenAiClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            PipelineError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &ClassifierConfig, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: HttpTransport::new(config, OPENAI_BASE_URL)?,
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    fn name(&self) -> &str {
        "openai"
    }

    async fn invoke(
        &self,
        instructions: &str,
        payload: &str,
        expected_shape: &Value,
    ) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.http.base_url);
        let body = json!({
            "model": self.http.model,
            "messages": [
                { "role": "system", "content": instructions },
                { "role": "user", "content": payload }
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": { "name": "response", "schema": expected_shape }
            }
        });
        let headers = [("Authorization", format!("Bearer {}", self.api_key))];

        let json = self.http.post_json("openai", &url, &headers, &body).await?;
        json.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| missing_text("openai", "choices[0].message.content"))
    }
}

// ============ Ollama ============

/// A local Ollama server via `POST /api/chat` with schema-constrained output.
pub struct OllamaClassifier {
    http: HttpTransport,
}

impl OllamaClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        Ok(Self {
            http: HttpTransport::new(config, OLLAMA_BASE_URL)?,
        })
    }
}

#[async_trait]
impl Classifier for OllamaClassifier {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn invoke(
        &self,
        instructions: &str,
        payload: &str,
        expected_shape: &Value,
    ) -> Result<String> {
        let url = format!("{}/api/chat", self.http.base_url);
        let body = json!({
            "model": self.http.model,
            "messages": [
                { "role": "system", "content": instructions },
                { "role": "user", "content": payload }
            ],
            "stream": false,
            "format": expected_shape,
        });

        let json = self.http.post_json("ollama", &url, &[], &body).await?;
        json.pointer("/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| missing_text("ollama", "message.content"))
    }
}
