

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::base::{LlmMetadata, LlmProvider, LlmProviderError};


/// Tries `primary`, and on any error retries the same prompt on `fallback`.
pub struct LlmProviderWithFallback {
    primary: Arc<dyn LlmProvider>,
    fallback: Arc<dyn LlmProvider>,
    fallback_count: AtomicUsize,
    primary_failures: AtomicUsize,
}

impl LlmProviderWithFallback {

    pub fn new(primary: Arc<dyn LlmProvider>, fallback: Arc<dyn LlmProvider>) -> Self {
        info!(
            "LlmProviderWithFallback initialized: primary={}/{}, fallback={}/{}",
            primary.provider_name(),
            primary.model_name(),
            fallback.provider_name(),
            fallback.model_name()
        );

        Self {
            primary,
            fallback,
            fallback_count: AtomicUsize::new(0),
            primary_failures: AtomicUsize::new(0),
        }
    }


    pub fn fallback_count(&self) -> usize {
        self.fallback_count.load(Ordering::SeqCst)
    }


    pub fn primary_failures(&self) -> usize {
        self.primary_failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for LlmProviderWithFallback {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        json_mode: bool,
    ) -> Result<(String, LlmMetadata), LlmProviderError> {
        let original_error = match self.primary.generate(system_prompt, user_prompt, json_mode).await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        let failures = self.primary_failures.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(
            "Primary LLM provider {} failed ({}x), falling back to {}: {}",
            self.primary.provider_name(),
            failures,
            self.fallback.provider_name(),
            original_error
        );

        let (content, mut metadata) = self
            .fallback
            .generate(system_prompt, user_prompt, json_mode)
            .await?;

        metadata.fallback_used = true;
        metadata.original_error = Some(original_error.to_string());
        self.fallback_count.fetch_add(1, Ordering::SeqCst);

        Ok((content, metadata))
    }

    fn provider_name(&self) -> &str {
        self.primary.provider_name()
    }

    fn model_name(&self) -> &str {
        self.primary.model_name()
    }
}
