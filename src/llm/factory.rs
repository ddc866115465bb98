

use std::sync::Arc;
use std::time::Duration;

use super::providers::base::LlmProvider;
use super::providers::fallback::LlmProviderWithFallback;
use super::providers::gemini::GeminiProvider;
use super::providers::ollama::OllamaProvider;
use crate::core::config::MiseConfig;
use crate::core::error::{MiseError, Result};
use crate::DEFAULT_OLLAMA_URL;


pub struct LlmProviderFactory;

impl LlmProviderFactory {

    pub fn create(
        provider: &str,
        model: &str,
        api_key: Option<&str>,
        base_url: Option<&str>,
        temperature: f64,
        timeout: Duration,
    ) -> Result<Arc<dyn LlmProvider>> {
        match provider {
            "gemini" => {
                let api_key = api_key
                    .filter(|key| !key.trim().is_empty())
                    .ok_or_else(|| MiseError::config("gemini provider needs an API key"))?;
                let mut gemini = GeminiProvider::new(api_key, model, temperature, timeout)?;
                if let Some(base_url) = base_url {
                    gemini = gemini.with_base_url(base_url);
                }
                Ok(Arc::new(gemini))
            }
            "ollama" => Ok(Arc::new(OllamaProvider::new(
                base_url.unwrap_or(DEFAULT_OLLAMA_URL),
                model,
                temperature,
                timeout,
            )?)),
            other => Err(MiseError::config(format!(
                "unknown LLM provider: {other}. Supported: gemini, ollama"
            ))),
        }
    }

    /// Primary provider from config, wrapped with the Ollama fallback when enabled.
    pub fn from_config(config: &MiseConfig) -> Result<Arc<dyn LlmProvider>> {
        let timeout = Duration::from_secs(config.collaborator_timeout_secs);
        let primary = Self::create(
            &config.llm_provider,
            &config.llm_model,
            config.llm_api_key.as_deref(),
            config.llm_base_url.as_deref(),
            config.llm_temperature,
            timeout,
        )?;

        if !config.llm_fallback_enabled {
            return Ok(primary);
        }

        let fallback = Self::create(
            "ollama",
            &config.llm_fallback_model,
            None,
            Some(&config.llm_fallback_url),
            config.llm_temperature,
            timeout,
        )?;
        Ok(Arc::new(LlmProviderWithFallback::new(primary, fallback)))
    }
}
