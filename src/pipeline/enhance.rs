//! Enhancement stage: raw Markdown to polished Markdown.
//!
//! Optional and never fatal. Every way it can go wrong (disabled, no
//! credentials, retries exhausted, a reply that cleans down to nothing)
//! degrades to an identity copy of the input.

use crate::config::ConversionConfig;
use crate::pipeline::llm::{chat_with_retry, ChatClient, ChatRequest, RetryPolicy};
use crate::pipeline::postprocess::clean_enhanced;
use crate::pipeline::stage::StageOutcome;
use crate::prompts::enhance_system_prompt;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Enhancer {
    client: Option<Arc<dyn ChatClient>>,
    policy: RetryPolicy,
    enabled: bool,
    insert_questions: bool,
    temperature: f32,
    max_tokens: usize,
}

impl Enhancer {
    /// `client` is `None` when no provider credentials could be resolved.
    pub fn new(client: Option<Arc<dyn ChatClient>>, config: &ConversionConfig) -> Self {
        Self {
            client,
            policy: RetryPolicy::from_config(config),
            enabled: config.enhance,
            insert_questions: config.insert_questions,
            temperature: config.enhance_temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub async fn run(&self, raw: &str) -> StageOutcome<String> {
        if !self.enabled {
            return StageOutcome::degraded(raw.to_string(), "enhancement disabled");
        }
        let Some(client) = &self.client else {
            warn!("Enhancement skipped: no LLM credentials configured");
            return StageOutcome::degraded(raw.to_string(), "no LLM credentials configured");
        };

        let request = ChatRequest {
            system: enhance_system_prompt(self.insert_questions),
            user: raw.to_string(),
            images: Vec::new(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        match chat_with_retry(client.as_ref(), &request, self.policy).await {
            Ok(reply) => {
                let cleaned = clean_enhanced(&reply);
                if cleaned.trim().is_empty() {
                    warn!("Enhancement reply was empty after cleanup, keeping raw Markdown");
                    return StageOutcome::degraded(raw.to_string(), "empty enhancement reply");
                }
                info!(
                    "Enhanced Markdown with '{}': {} → {} chars",
                    client.name(),
                    raw.chars().count(),
                    cleaned.chars().count()
                );
                StageOutcome::Succeeded(cleaned)
            }
            Err(e) => {
                warn!("Enhancement failed after {} retries, keeping raw Markdown — {}", self.policy.max_retries, e);
                StageOutcome::degraded(raw.to_string(), e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Reply(&'static str);

    #[async_trait]
    impl ChatClient for Reply {
        fn name(&self) -> &str {
            "reply"
        }

        async fn complete(&self, request: &ChatRequest) -> Result<String, CallError> {
            assert!(request.images.is_empty());
            Ok(self.0.to_string())
        }
    }

    #[derive(Default)]
    struct AlwaysDown(AtomicU32);

    #[async_trait]
    impl ChatClient for AlwaysDown {
        fn name(&self) -> &str {
            "down"
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<String, CallError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(CallError::Api("503 Service Unavailable".into()))
        }
    }

    fn config(retries: u32) -> ConversionConfig {
        ConversionConfig::builder()
            .max_retries(retries)
            .retry_delay_ms(1)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn cleaned_reply_is_used() {
        let e = Enhancer::new(Some(Arc::new(Reply("```markdown\n# T\n\nBetter.\n```"))), &config(0));
        let out = e.run("# T\n\nraw").await;
        assert!(matches!(out, StageOutcome::Succeeded(ref s) if s == "# T\n\nBetter.\n"));
    }

    #[tokio::test]
    async fn no_credentials_is_identity() {
        let out = Enhancer::new(None, &config(2)).run("raw text\n").await;
        assert!(out.is_degraded());
        assert_eq!(out.into_result().unwrap(), "raw text\n");
    }

    #[tokio::test]
    async fn exhausted_retries_is_identity() {
        let client = Arc::new(AlwaysDown::default());
        let e = Enhancer::new(Some(client.clone() as Arc<dyn ChatClient>), &config(0));
        let out = e.run("raw\n").await;
        assert!(out.is_degraded());
        assert_eq!(out.into_result().unwrap(), "raw\n");
        assert_eq!(client.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_skips_the_call() {
        let client = Arc::new(AlwaysDown::default());
        let c = ConversionConfig::builder().enhance(false).build().unwrap();
        let out = Enhancer::new(Some(client.clone() as Arc<dyn ChatClient>), &c)
            .run("x\n")
            .await;
        assert!(out.is_degraded());
        assert_eq!(client.0.load(Ordering::SeqCst), 0);
    }
}
