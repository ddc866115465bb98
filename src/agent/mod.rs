

pub mod dispatcher;
pub mod orchestrator;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

pub use dispatcher::{render_recipe, ActionDispatcher, Collaborators, DispatchOutcome};
pub use orchestrator::{CookingAgent, TurnReport, TurnStatus};

use crate::collaborators::{
    EmailService, HttpEmailService, MockDelivery, RecipeBook, UnconfiguredEmailService,
};
use crate::core::config::MiseConfig;
use crate::core::error::Result;
use crate::decision::{ActionSelector, DecisionEngine, LlmDecisionEngine};
use crate::llm::{FactExtractor, LlmFactExtractor, LlmProviderFactory, RuleFactExtractor};
use crate::session::{InMemoryStateStore, JsonFileStateStore, StateStore};


/// Wires a `CookingAgent` from configuration. Fails on invalid settings or a
/// language-model mode without credentials; missing email credentials only warn.
pub fn build_agent(config: &MiseConfig) -> Result<CookingAgent> {
    config.validate()?;
    let timeout = Duration::from_secs(config.collaborator_timeout_secs);

    let store: Arc<dyn StateStore> = match config.store_backend.as_str() {
        "memory" => Arc::new(InMemoryStateStore::new()),
        _ => Arc::new(JsonFileStateStore::new(&config.state_dir)),
    };

    let llm = if config.uses_llm() {
        Some(LlmProviderFactory::from_config(config)?)
    } else {
        None
    };

    let extractor: Arc<dyn FactExtractor> = match (config.extractor.as_str(), &llm) {
        ("llm", Some(llm)) => Arc::new(LlmFactExtractor::new(llm.clone())),
        _ => Arc::new(RuleFactExtractor::new()),
    };

    let selector: Arc<dyn ActionSelector> = match (config.decision_mode.as_str(), &llm) {
        ("llm", Some(llm)) => Arc::new(LlmDecisionEngine::new(llm.clone())),
        _ => Arc::new(DecisionEngine::new()),
    };

    let email: Arc<dyn EmailService> = match config.email_api_key.as_deref() {
        Some(key) if config.email_configured() => Arc::new(HttpEmailService::new(
            &config.email_endpoint,
            key,
            &config.email_from,
            timeout,
        )?),
        _ => {
            warn!("No email API key configured; order confirmations cannot be sent");
            Arc::new(UnconfiguredEmailService)
        }
    };

    let collaborators = Collaborators {
        recipes: Arc::new(RecipeBook::new()),
        ordering: Arc::new(MockDelivery::new()),
        email,
    };

    info!(
        "Agent wired: store={}, extractor={}, decision={}",
        config.store_backend, config.extractor, config.decision_mode
    );

    Ok(CookingAgent::new(store, extractor, selector, ActionDispatcher::new(collaborators, timeout))
        .with_limits(config.max_attempts, config.max_cycles_per_turn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::MiseError;

    fn memory_config() -> MiseConfig {
        let mut config = MiseConfig::default();
        config.store_backend = "memory".to_string();
        config
    }

    #[tokio::test]
    async fn test_default_agent_runs_the_builtin_kitchen() {
        let agent = build_agent(&memory_config()).unwrap();
        assert!(!agent.dispatcher().collaborators().email.is_configured());

        agent.handle_turn("s1", Some("pasta carbonara")).await.unwrap();
        let report = agent
            .handle_turn("s1", Some("spaghetti, eggs, pecorino cheese, guanciale, black pepper, salt"))
            .await
            .unwrap();
        assert_eq!(report.status, TurnStatus::Completed);
    }

    #[tokio::test]
    async fn test_missing_email_key_stalls_at_confirmation() {
        let agent = build_agent(&memory_config()).unwrap();

        agent.handle_turn("s1", Some("chicken curry")).await.unwrap();
        agent.handle_turn("s1", Some("rice")).await.unwrap();
        let report = agent.handle_turn("s1", Some("cook@example.com")).await.unwrap();

        assert!(matches!(
            report.status,
            TurnStatus::Stalled {
                action: crate::decision::ActionKind::SendConfirmationEmail,
                ..
            }
        ));
        let state = agent.snapshot("s1").await.unwrap().unwrap();
        assert!(state.order_id.is_some());
        assert!(!state.email_sent);
    }

    #[test]
    fn test_llm_mode_without_key_fails_at_startup() {
        let mut config = memory_config();
        config.decision_mode = "llm".to_string();
        assert!(matches!(build_agent(&config), Err(MiseError::Config(_))));
    }

    #[test]
    fn test_configured_email_uses_http_service() {
        let mut config = memory_config();
        config.email_api_key = Some("re_test".to_string());
        let agent = build_agent(&config).unwrap();
        assert!(agent.dispatcher().collaborators().email.is_configured());
    }
}
