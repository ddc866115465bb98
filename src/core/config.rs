

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{MiseError, Result};
use crate::{
    DEFAULT_COLLABORATOR_TIMEOUT_SECS, DEFAULT_EMAIL_ENDPOINT, DEFAULT_LLM_MODEL,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CYCLES_PER_TURN, DEFAULT_OLLAMA_URL,
};

const ENV_PREFIX: &str = "MISE";
const DEFAULT_CONFIG_FILE: &str = "mise";


#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MiseConfig {

    pub store_backend: String,
    pub state_dir: String,


    pub extractor: String,
    pub decision_mode: String,


    pub llm_provider: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_temperature: f64,


    pub llm_fallback_enabled: bool,
    pub llm_fallback_url: String,
    pub llm_fallback_model: String,


    pub collaborator_timeout_secs: u64,
    pub max_attempts: u32,
    pub max_cycles_per_turn: usize,


    pub email_endpoint: String,
    pub email_api_key: Option<String>,
    pub email_from: String,
}

impl MiseConfig {

    pub fn new() -> Self {
        Self {
            store_backend: "file".to_string(),
            state_dir: ".mise/sessions".to_string(),

            extractor: "rules".to_string(),
            decision_mode: "ladder".to_string(),

            llm_provider: "gemini".to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            llm_api_key: None,
            llm_base_url: None,
            llm_temperature: 0.2,

            llm_fallback_enabled: false,
            llm_fallback_url: DEFAULT_OLLAMA_URL.to_string(),
            llm_fallback_model: "llama3.2".to_string(),

            collaborator_timeout_secs: DEFAULT_COLLABORATOR_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_cycles_per_turn: DEFAULT_MAX_CYCLES_PER_TURN,

            email_endpoint: DEFAULT_EMAIL_ENDPOINT.to_string(),
            email_api_key: None,
            email_from: "Mise Kitchen <kitchen@mise.local>".to_string(),
        }
    }

    /// Layers `mise.toml` (or `path`) under `MISE_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        builder = match path {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let loaded: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| MiseError::config(e.to_string()))?;

        debug!(
            "Config loaded: store={}, extractor={}, decision={}, llm={}/{}",
            loaded.store_backend,
            loaded.extractor,
            loaded.decision_mode,
            loaded.llm_provider,
            loaded.llm_model
        );
        Ok(loaded)
    }

    pub fn uses_llm(&self) -> bool {
        self.extractor == "llm" || self.decision_mode == "llm"
    }

    pub fn email_configured(&self) -> bool {
        self.email_api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    /// Startup checks. A missing email key is deliberately not an error here.
    pub fn validate(&self) -> Result<()> {
        match self.store_backend.as_str() {
            "file" | "memory" => {}
            other => return Err(MiseError::config(format!("unknown store_backend '{other}' (file, memory)"))),
        }
        match self.extractor.as_str() {
            "rules" | "llm" => {}
            other => return Err(MiseError::config(format!("unknown extractor '{other}' (rules, llm)"))),
        }
        match self.decision_mode.as_str() {
            "ladder" | "llm" => {}
            other => return Err(MiseError::config(format!("unknown decision_mode '{other}' (ladder, llm)"))),
        }
        if self.collaborator_timeout_secs == 0 {
            return Err(MiseError::config("collaborator_timeout_secs must be positive"));
        }
        if self.max_attempts == 0 || self.max_cycles_per_turn == 0 {
            return Err(MiseError::config("max_attempts and max_cycles_per_turn must be positive"));
        }

        check_url("email_endpoint", &self.email_endpoint)?;

        if self.uses_llm() {
            match self.llm_provider.as_str() {
                "gemini" => {
                    let has_key = self
                        .llm_api_key
                        .as_deref()
                        .is_some_and(|key| !key.trim().is_empty());
                    if !has_key {
                        return Err(MiseError::config(
                            "llm_provider 'gemini' requires llm_api_key (MISE_LLM_API_KEY)",
                        ));
                    }
                }
                "ollama" => {}
                other => {
                    return Err(MiseError::config(format!(
                        "unknown llm_provider '{other}' (gemini, ollama)"
                    )));
                }
            }
            if let Some(base_url) = &self.llm_base_url {
                check_url("llm_base_url", base_url)?;
            }
            if self.llm_fallback_enabled {
                check_url("llm_fallback_url", &self.llm_fallback_url)?;
            }
        }

        Ok(())
    }
}

impl Default for MiseConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn check_url(key: &str, value: &str) -> Result<()> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| MiseError::config(format!("{key} is not a valid URL ({value}): {e}")))
}
