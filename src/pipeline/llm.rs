//! Model calls: one small trait seam, a provider-backed implementation, and
//! the bounded fixed-delay retry every stage shares.
//!
//! Stages talk to [`ChatClient`] rather than to `edgequake_llm` directly so
//! tests can substitute scripted clients and so a timeout can be enforced
//! uniformly, whatever the provider does internally.

use crate::config::ConversionConfig;
use crate::error::{CallError, Pdf2DocxError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Default model when a provider is named without one.
const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// One chat completion request.
#[derive(Clone, Default)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub images: Vec<ImageData>,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Anything that can answer a [`ChatRequest`].
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    async fn complete(&self, request: &ChatRequest) -> Result<String, CallError>;
}

/// [`ChatClient`] over an `edgequake_llm` provider.
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }
}

#[async_trait]
impl ChatClient for ProviderClient {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, CallError> {
        let start = Instant::now();
        let mut messages = vec![ChatMessage::system(&request.system)];
        if request.images.is_empty() {
            messages.push(ChatMessage::user(&request.user));
        } else {
            messages.push(ChatMessage::user_with_images(
                &request.user,
                request.images.clone(),
            ));
        }
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| CallError::Api(e.to_string()))?;
        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.label,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

// ── Retry ────────────────────────────────────────────────────────────────────

/// Attempts, delay and per-call timeout for one kind of call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub delay: Duration,
    pub call_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: Duration::from_millis(config.retry_delay_ms),
            call_timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }
}

/// Call `client` up to `1 + max_retries` times, waiting a fixed delay between
/// attempts. Empty replies count as failures.
pub async fn chat_with_retry(
    client: &dyn ChatClient,
    request: &ChatRequest,
    policy: RetryPolicy,
) -> Result<String, CallError> {
    let mut last_err = CallError::EmptyReply;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            warn!(
                "{}: retry {}/{} after {:?}",
                client.name(),
                attempt,
                policy.max_retries,
                policy.delay
            );
            sleep(policy.delay).await;
        }

        let outcome = match timeout(policy.call_timeout, client.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(CallError::Timeout {
                secs: policy.call_timeout.as_secs(),
            }),
        };

        match outcome {
            Ok(content) if !content.trim().is_empty() => return Ok(content),
            Ok(_) => last_err = CallError::EmptyReply,
            Err(e) => last_err = e,
        }
        warn!("{}: attempt {} failed — {}", client.name(), attempt + 1, last_err);
    }

    Err(last_err)
}

// ── Provider resolution ──────────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Pdf2DocxError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2DocxError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. pre-built `config.provider`;
/// 2. `config.provider_name` + `config.model`;
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set;
/// 4. `OPENAI_API_KEY` → OpenAI;
/// 5. `ProviderFactory::from_env()` auto-detection.
pub fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn LLMProvider>, Pdf2DocxError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2DocxError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}

/// Resolve a provider and wrap it as a [`ChatClient`].
pub fn resolve_chat_client(config: &ConversionConfig) -> Result<Arc<dyn ChatClient>, Pdf2DocxError> {
    let provider = resolve_provider(config)?;
    let label = config
        .model
        .clone()
        .or_else(|| config.provider_name.clone())
        .unwrap_or_else(|| "llm".to_string());
    Ok(Arc::new(ProviderClient::new(provider, label)))
}
