

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::engine::{ActionSelector, DecisionEngine};
use super::models::{ActionKind, Decision};
use super::prompt::{build_decision_prompt, SYSTEM_PROMPT};
use crate::llm::providers::base::{strip_code_fences, LlmProvider};
use crate::session::SessionState;

#[derive(Debug, Deserialize)]
struct Proposal {
    action: String,
    #[serde(default)]
    reasoning: String,
}


/// Lets a language model propose the next action. The ladder still has the
/// final word: a proposal is only taken when it names the ladder's action.
pub struct LlmDecisionEngine {

    llm: Arc<dyn LlmProvider>,

    ladder: DecisionEngine,
}

impl LlmDecisionEngine {

    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        info!(
            "LlmDecisionEngine initialized: provider={}",
            llm.provider_name()
        );

        Self {
            llm,
            ladder: DecisionEngine::new(),
        }
    }

    pub async fn decide(&self, state: &SessionState) -> Decision {
        let expected = self.ladder.decide(state);
        let prompt = build_decision_prompt(state);

        debug!("Calling LLM for decision (ladder says {})", expected.kind());

        let response = match self.llm.generate(SYSTEM_PROMPT, &prompt, true).await {
            Ok((response, _metadata)) => response,
            Err(e) => {
                warn!("LLM call failed: {}", e);
                return expected;
            }
        };

        let proposal = match serde_json::from_str::<Proposal>(strip_code_fences(&response)) {
            Ok(proposal) => proposal,
            Err(e) => {
                warn!("Failed to parse LLM response as JSON: {}", e);
                warn!("Response was: {}", crate::safe_truncate(&response, 200));
                return expected;
            }
        };

        match proposal.action.trim().parse::<ActionKind>() {
            Ok(kind) if kind == expected.kind() => {
                info!("Decision made: action={}, reasoning={}", kind, proposal.reasoning);
                if proposal.reasoning.trim().is_empty() {
                    expected
                } else {
                    Decision::new(expected.action, proposal.reasoning)
                }
            }
            Ok(kind) => {
                warn!(
                    "LLM proposed {} out of order; ladder requires {}",
                    kind,
                    expected.kind()
                );
                expected
            }
            Err(_) => {
                warn!("LLM proposed unknown action '{}'", proposal.action);
                expected
            }
        }
    }
}

#[async_trait]
impl ActionSelector for LlmDecisionEngine {
    async fn select(&self, state: &SessionState) -> Decision {
        self.decide(state).await
    }

    fn name(&self) -> &str {
        self.llm.provider_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::base::testing::ScriptedProvider;

    fn with_dish() -> SessionState {
        let mut state = SessionState::new();
        state.dish_name = Some("chicken curry".to_string());
        state
    }

    fn engine(reply: Result<&str, &str>) -> LlmDecisionEngine {
        LlmDecisionEngine::new(Arc::new(ScriptedProvider::new(vec![reply])))
    }

    #[tokio::test]
    async fn test_agreeing_proposal_keeps_llm_reasoning() {
        let engine = engine(Ok(r#"{"action": "fetch_recipe", "reasoning": "Need the recipe first."}"#));
        let decision = engine.decide(&with_dish()).await;
        assert_eq!(decision.kind(), ActionKind::FetchRecipe);
        assert_eq!(decision.reasoning, "Need the recipe first.");
    }

    #[tokio::test]
    async fn test_out_of_order_proposal_is_overruled() {
        let engine = engine(Ok(r#"{"action": "place_order", "reasoning": "Order now."}"#));
        let decision = engine.decide(&with_dish()).await;
        assert_eq!(decision, DecisionEngine::new().decide(&with_dish()));
    }

    #[tokio::test]
    async fn test_garbage_and_errors_fall_back_to_ladder() {
        let ladder = DecisionEngine::new().decide(&with_dish());

        assert_eq!(engine(Ok("fetch the recipe")).decide(&with_dish()).await, ladder);
        assert_eq!(engine(Ok(r#"{"action": "dance"}"#)).decide(&with_dish()).await, ladder);
        assert_eq!(engine(Err("503")).decide(&with_dish()).await, ladder);
    }
}
