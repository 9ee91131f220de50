// Ollama HTTP client
// Embeddings for the schema index plus chat completions for query and answer generation


use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Lines};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::RagError;
use crate::config::Config;
use crate::pipeline::backend::{CompletionBackend, FragmentStream, receiver_stream};

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
const FRAGMENT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    embedding_model: String,
    completion_model: String,
    options: GenerationOptions,
    batch_size: u32,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
struct GenerationOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: GenerationOptions,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
    pub details: Option<ModelDetails>,
}

#[derive(Debug, Deserialize)]
pub struct ModelDetails {
    pub format: Option<String>,
    pub family: Option<String>,
    pub families: Option<Vec<String>>,
    pub parameter_size: Option<String>,
    pub quantization_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

/// Incremental chat output read line by line from an open `/api/chat` response.
///
/// Dropping this value drops the underlying response body, which closes the
/// connection to the server.
pub struct ChatFragments {
    lines: Lines<BufReader<ureq::BodyReader<'static>>>,
    finished: bool,
}

impl Iterator for ChatFragments {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(anyhow::Error::new(e).context("Failed to read chat stream")));
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            let chunk: ChatResponse = match serde_json::from_str(&line) {
                Ok(chunk) => chunk,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(
                        anyhow::Error::new(e).context("Failed to parse chat stream chunk")
                    ));
                }
            };

            if let Some(message) = chunk.error {
                self.finished = true;
                return Some(Err(anyhow::anyhow!("Ollama reported an error: {}", message)));
            }

            self.finished = chunk.done;

            if let Some(message) = chunk.message {
                if !message.content.is_empty() {
                    return Some(Ok(message.content));
                }
            }
        }

        None
    }
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.ollama.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            base_url,
            embedding_model: config.ollama.embedding_model.clone(),
            completion_model: config.ollama.completion_model.clone(),
            options: GenerationOptions {
                temperature: config.ollama.temperature,
                top_p: config.ollama.top_p,
            },
            batch_size: config.ollama.batch_size,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Test connection to Ollama server and verify both models are available
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models().context("Server ping failed")?;

        for model in [&self.embedding_model, &self.completion_model] {
            if !models.iter().any(|m| &m.name == model) {
                let available_models: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
                warn!(
                    "Model {} not found. Available models: {:?}",
                    model, available_models
                );
                return Err(anyhow::anyhow!(
                    "Model '{}' is not available. Available models: {:?}",
                    model,
                    available_models
                ));
            }
        }

        info!(
            "Health check passed for Ollama server at {} with models {} and {}",
            self.base_url, self.embedding_model, self.completion_model
        );
        Ok(())
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build models URL")?;

        debug!("Fetching available models from {}", url);

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .get(url.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to fetch models")?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Generate embeddings for multiple texts, batched to avoid overwhelming the server
    #[inline]
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size as usize) {
            let batch = self
                .embed_single_batch(chunk)
                .with_context(|| format!("Failed to process batch of {} texts", chunk.len()))?;
            results.extend(batch);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self
            .base_url
            .join("/api/embed")
            .context("Failed to build embedding URL")?;

        let request_json = serde_json::to_string(&EmbedRequest {
            model: &self.embedding_model,
            input: texts,
        })
        .context("Failed to serialize embedding request")?;

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(request_json.as_str())
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to generate embeddings")?;

        let response: EmbedResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        if response.embeddings.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            ));
        }

        Ok(response.embeddings)
    }

    /// Run a chat completion and return the full reply
    #[inline]
    pub fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = self
            .base_url
            .join("/api/chat")
            .context("Failed to build chat URL")?;

        let request_json = self.chat_request_json(messages, false)?;

        debug!(
            "Requesting chat completion from {} with {} messages",
            self.completion_model,
            messages.len()
        );

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(request_json.as_str())
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to generate chat completion")?;

        let response: ChatResponse =
            serde_json::from_str(&response_text).context("Failed to parse chat response")?;

        if let Some(message) = response.error {
            return Err(anyhow::anyhow!("Ollama reported an error: {}", message));
        }

        let content = response.message.map(|m| m.content).unwrap_or_default();
        debug!("Chat completion returned {} characters", content.len());
        Ok(content)
    }

    /// Open a streaming chat completion.
    ///
    /// Connection failures surface here; the returned iterator yields reply
    /// fragments as the server produces them.
    #[inline]
    pub fn chat_stream(&self, messages: &[ChatMessage]) -> Result<ChatFragments> {
        let url = self
            .base_url
            .join("/api/chat")
            .context("Failed to build chat URL")?;

        let request_json = self.chat_request_json(messages, true)?;

        debug!(
            "Opening streaming chat completion with {}",
            self.completion_model
        );

        let response = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(request_json.as_str())
            })
            .context("Failed to open chat stream")?;

        Ok(ChatFragments {
            lines: BufReader::new(response.into_body().into_reader()).lines(),
            finished: false,
        })
    }

    fn chat_request_json(&self, messages: &[ChatMessage], stream: bool) -> Result<String> {
        serde_json::to_string(&ChatRequest {
            model: &self.completion_model,
            messages,
            stream,
            options: self.options,
        })
        .context("Failed to serialize chat request")
    }

    fn make_request_with_retry<T, F>(&self, mut request_fn: F) -> Result<T>
    where
        F: FnMut() -> Result<T, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response);
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        let delay = Duration::from_millis(delay_ms);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

/// Send fragments into `tx` until they run out or the receiver is dropped.
/// Returns how many fragments were delivered.
fn forward_fragments<I>(fragments: I, tx: &mpsc::Sender<crate::Result<String>>) -> usize
where
    I: IntoIterator<Item = Result<String>>,
{
    let mut delivered = 0;
    for fragment in fragments {
        let item = fragment.map_err(|e| RagError::Completion(format!("{:#}", e)));
        if tx.blocking_send(item).is_err() {
            debug!("Answer consumer dropped, closing completion stream");
            break;
        }
        delivered += 1;
    }
    delivered
}

#[async_trait]
impl CompletionBackend for OllamaClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> crate::Result<String> {
        let client = self.clone();
        let messages = [
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_prompt),
        ];

        tokio::task::spawn_blocking(move || client.chat(&messages))
            .await
            .map_err(|e| RagError::Completion(format!("Completion task failed: {}", e)))?
            .map_err(|e| RagError::Completion(format!("{:#}", e)))
    }

    async fn complete_streaming(&self, prompt: &str) -> crate::Result<FragmentStream> {
        let client = self.clone();
        let messages = [ChatMessage::user(prompt)];

        let fragments = tokio::task::spawn_blocking(move || client.chat_stream(&messages))
            .await
            .map_err(|e| RagError::Network(format!("Completion task failed: {}", e)))?
            .map_err(|e| RagError::Network(format!("{:#}", e)))?;

        let (tx, rx) = mpsc::channel(FRAGMENT_CHANNEL_CAPACITY);

        tokio::task::spawn_blocking(move || forward_fragments(fragments, &tx));

        Ok(receiver_stream(rx))
    }
}
