

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::dispatcher::{ActionDispatcher, DispatchOutcome};
use crate::core::error::{MiseError, Result};
use crate::decision::engine::{ActionSelector, DecisionEngine};
use crate::decision::models::ActionKind;
use crate::llm::extractor::FactExtractor;
use crate::session::{SessionField, SessionState, SessionSummary, StateStore};
use crate::{DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CYCLES_PER_TURN};


#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnStatus {
    AwaitingInput { field: SessionField },
    Completed,
    /// One action kept failing, or the turn ran out of cycles. The session is resumable.
    Stalled { action: ActionKind, attempts: u32 },
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnReport {
    pub messages: Vec<String>,
    pub status: TurnStatus,
}


/// Drives a session through perceive, recall, decide and act until it needs
/// the user, finishes, or stalls.
pub struct CookingAgent {
    store: Arc<dyn StateStore>,
    extractor: Arc<dyn FactExtractor>,
    selector: Arc<dyn ActionSelector>,
    dispatcher: ActionDispatcher,
    ladder: DecisionEngine,
    max_attempts: u32,
    max_cycles: usize,
}

impl CookingAgent {
    pub fn new(
        store: Arc<dyn StateStore>,
        extractor: Arc<dyn FactExtractor>,
        selector: Arc<dyn ActionSelector>,
        dispatcher: ActionDispatcher,
    ) -> Self {
        info!(
            "CookingAgent initialized: extractor={}, selector={}",
            extractor.name(),
            selector.name()
        );

        Self {
            store,
            extractor,
            selector,
            dispatcher,
            ladder: DecisionEngine::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_cycles: DEFAULT_MAX_CYCLES_PER_TURN,
        }
    }

    pub fn with_limits(mut self, max_attempts: u32, max_cycles: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.max_cycles = max_cycles.max(1);
        self
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    pub async fn snapshot(&self, session_id: &str) -> Result<Option<SessionState>> {
        self.store.load(session_id).await
    }

    pub async fn sessions(&self) -> Result<Vec<SessionSummary>> {
        self.store.list().await
    }

    /// Runs one user turn. `utterance` is `None` when starting or resuming
    /// without new input.
    pub async fn handle_turn(&self, session_id: &str, utterance: Option<&str>) -> Result<TurnReport> {
        let mut state = match self.store.load(session_id).await? {
            Some(state) => {
                debug!("Resuming session {} at turn {}", session_id, state.turn_count);
                state
            }
            None => {
                info!("Starting session {}", session_id);
                SessionState::new()
            }
        };

        if let Some(text) = utterance.map(str::trim).filter(|text| !text.is_empty()) {
            self.perceive(text, &mut state).await;
        }

        let mut messages = Vec::new();
        let mut failures: Option<(ActionKind, u32)> = None;
        let mut last_kind = ActionKind::RequestDishName;

        for _ in 0..self.max_cycles {
            let decision = self.selector.select(&state).await;
            last_kind = decision.kind();
            info!(
                "Session {} decision: {} ({})",
                session_id,
                last_kind,
                crate::safe_truncate(&decision.reasoning, 120)
            );

            let before = state.clone();
            let outcome = self.dispatcher.dispatch(&decision.action, &mut state).await?;
            state.turn_count += 1;

            let rejected_dish = matches!(outcome, DispatchOutcome::DishNotFound { .. });
            if !rejected_dish && !state.extends(&before) {
                error!("Session {} lost facts while running {}", session_id, last_kind);
                return Err(MiseError::invariant(format!("{last_kind} unset a session fact")));
            }
            if let Err(e) = state.check_invariants() {
                error!("Session {} invariant violated: {}", session_id, e);
                return Err(e);
            }

            self.store.save(session_id, &state).await?;
            debug!("Session {} persisted at turn {}", session_id, state.turn_count);
            messages.push(outcome.message().to_string());

            match outcome {
                DispatchOutcome::Prompt { field, .. } => {
                    return Ok(TurnReport {
                        messages,
                        status: TurnStatus::AwaitingInput { field },
                    });
                }
                DispatchOutcome::Presented { .. } => {
                    self.store.archive(session_id).await?;
                    info!("Session {} completed after {} cycles", session_id, state.turn_count);
                    return Ok(TurnReport {
                        messages,
                        status: TurnStatus::Completed,
                    });
                }
                DispatchOutcome::Failed { action, .. } => {
                    let attempts = match failures {
                        Some((kind, count)) if kind == action => count + 1,
                        _ => 1,
                    };
                    failures = Some((action, attempts));
                    if attempts >= self.max_attempts {
                        warn!(
                            "Session {} stalled: {} failed {} times in a row",
                            session_id, action, attempts
                        );
                        return Ok(TurnReport {
                            messages,
                            status: TurnStatus::Stalled { action, attempts },
                        });
                    }
                }
                DispatchOutcome::Progressed { .. } | DispatchOutcome::DishNotFound { .. } => {
                    failures = None;
                }
            }
        }

        warn!("Session {} used all {} cycles of this turn", session_id, self.max_cycles);
        Ok(TurnReport {
            messages,
            status: TurnStatus::Stalled {
                action: last_kind,
                attempts: failures.map(|(_, count)| count).unwrap_or(0),
            },
        })
    }

    /// Extracts facts from the user's words and folds them into unset fields.
    async fn perceive(&self, utterance: &str, state: &mut SessionState) {
        let expected = self.expected_fields(state);
        if expected.is_empty() {
            debug!("Nothing left to ask for; ignoring utterance");
            return;
        }

        match self.extractor.extract(utterance, &expected).await {
            Ok(update) => {
                let applied = state.apply_facts(&update);
                info!(
                    "Extracted from '{}': applied {:?}",
                    crate::safe_truncate_ellipsis(utterance, 60),
                    applied
                );
            }
            Err(e) => warn!("Fact extraction failed, treating as no answer: {}", e),
        }
    }

    /// The field currently being asked for, then every other unset input field.
    fn expected_fields(&self, state: &SessionState) -> Vec<SessionField> {
        let mut fields = Vec::new();
        if let Some(field) = self.ladder.decide(state).action.requested_field() {
            fields.push(field);
        }
        for field in state.unset_input_fields() {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use super::*;
    use crate::agent::dispatcher::Collaborators;
    use crate::collaborators::fakes::{CountingRecipes, FixedRecipe, FlakyOrdering, RecordingEmail};
    use crate::collaborators::{EmailService, OrderingService, RecipeLookup};
    use crate::llm::extractor::fakes::CountingExtractor;
    use crate::llm::extractor::RuleFactExtractor;
    use crate::session::{InMemoryStateStore, JsonFileStateStore};

    struct Harness {
        extractor: Arc<CountingExtractor>,
        recipes: Arc<FixedRecipe>,
        ordering: Arc<FlakyOrdering>,
        email: Arc<RecordingEmail>,
        store: Arc<InMemoryStateStore>,
    }

    impl Harness {
        fn new(ordering_failures: usize, email_failures: usize) -> Self {
            Self {
                extractor: Arc::new(CountingExtractor::new()),
                recipes: Arc::new(FixedRecipe::new(
                    &["Chicken", "onion", "Ginger", "curry powder"],
                    &["Brown the chicken", "Add everything else", "Simmer"],
                )),
                ordering: Arc::new(FlakyOrdering::new(ordering_failures)),
                email: Arc::new(RecordingEmail::new(email_failures)),
                store: Arc::new(InMemoryStateStore::new()),
            }
        }

        fn agent(&self) -> CookingAgent {
            let recipes: Arc<dyn RecipeLookup> = self.recipes.clone();
            let ordering: Arc<dyn OrderingService> = self.ordering.clone();
            let email: Arc<dyn EmailService> = self.email.clone();
            let dispatcher = ActionDispatcher::new(
                Collaborators {
                    recipes,
                    ordering,
                    email,
                },
                Duration::from_secs(1),
            );
            CookingAgent::new(
                self.store.clone(),
                self.extractor.clone(),
                Arc::new(DecisionEngine::new()),
                dispatcher,
            )
        }
    }

    fn awaiting(report: &TurnReport) -> Option<SessionField> {
        match report.status {
            TurnStatus::AwaitingInput { field } => Some(field),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_chicken_curry_end_to_end() {
        let harness = Harness::new(0, 0);
        let agent = harness.agent();

        let report = agent.handle_turn("s1", None).await.unwrap();
        assert_eq!(awaiting(&report), Some(SessionField::DishName));

        let report = agent.handle_turn("s1", Some("chicken curry")).await.unwrap();
        assert_eq!(awaiting(&report), Some(SessionField::PantryItems));

        let report = agent.handle_turn("s1", Some("chicken, Onion, ginger")).await.unwrap();
        assert_eq!(awaiting(&report), Some(SessionField::UserEmail));
        assert!(report.messages.iter().any(|m| m.contains("curry powder")));

        let report = agent.handle_turn("s1", Some("cook@example.com")).await.unwrap();
        assert_eq!(report.status, TurnStatus::Completed);
        let rendering = report.messages.last().unwrap();
        assert!(rendering.contains("- curry powder (ordered)"));
        assert!(rendering.contains("- onion\n"));

        assert_eq!(harness.extractor.calls(), 3);
        assert_eq!(harness.recipes.calls(), 1);
        assert_eq!(harness.ordering.calls(), 1);
        assert_eq!(harness.email.calls(), 1);
        assert_eq!(
            harness.ordering.orders.lock()[0],
            ["curry powder".to_string()].into_iter().collect::<BTreeSet<_>>()
        );
        assert!(harness.store.is_archived("s1"));

        let state = agent.snapshot("s1").await.unwrap().unwrap();
        assert_eq!(state.order_id.as_deref(), Some("order-1"));
        assert!(state.email_sent);
        assert!(state.is_terminal());
    }

    #[tokio::test]
    async fn test_one_utterance_can_fill_several_fields() {
        let harness = Harness::new(0, 0);
        let agent = harness.agent();

        let report = agent
            .handle_turn(
                "s1",
                Some("dish: chicken curry; have: chicken, onion, ginger; email: cook@example.com"),
            )
            .await
            .unwrap();
        assert_eq!(report.status, TurnStatus::Completed);
        assert_eq!(harness.extractor.calls(), 1);
        assert_eq!(harness.recipes.calls(), 1);
        assert_eq!(harness.ordering.calls(), 1);
        assert_eq!(harness.email.calls(), 1);
    }

    #[tokio::test]
    async fn test_hedged_pantry_answer_is_asked_again() {
        let harness = Harness::new(0, 0);
        let agent = harness.agent();

        agent.handle_turn("s1", Some("chicken curry")).await.unwrap();
        let report = agent.handle_turn("s1", Some("hmm, not sure?")).await.unwrap();
        assert_eq!(awaiting(&report), Some(SessionField::PantryItems));

        let state = agent.snapshot("s1").await.unwrap().unwrap();
        assert!(state.pantry_items.is_none());
        assert_eq!(harness.ordering.calls(), 0);
    }

    #[tokio::test]
    async fn test_order_failure_is_retried_within_the_turn() {
        let harness = Harness::new(1, 0);
        let agent = harness.agent();

        agent.handle_turn("s1", Some("chicken curry")).await.unwrap();
        agent.handle_turn("s1", Some("chicken, onion, ginger")).await.unwrap();
        let report = agent.handle_turn("s1", Some("cook@example.com")).await.unwrap();

        assert_eq!(report.status, TurnStatus::Completed);
        assert_eq!(harness.ordering.calls(), 2);
        assert_eq!(harness.ordering.orders.lock().len(), 1);
        assert!(report.messages.iter().any(|m| m.contains("couldn't place")));
    }

    #[tokio::test]
    async fn test_everything_in_pantry_skips_order_and_email() {
        let harness = Harness::new(0, 0);
        let agent = harness.agent();

        agent.handle_turn("s1", Some("chicken curry")).await.unwrap();
        let report = agent
            .handle_turn("s1", Some("chicken, onion, ginger, curry powder"))
            .await
            .unwrap();

        assert_eq!(report.status, TurnStatus::Completed);
        assert_eq!(harness.ordering.calls(), 0);
        assert_eq!(harness.email.calls(), 0);
        let state = agent.snapshot("s1").await.unwrap().unwrap();
        assert_eq!(state.missing_ingredients, Some(Default::default()));
    }

    #[tokio::test]
    async fn test_unknown_dish_asks_again() {
        let recipes = Arc::new(CountingRecipes::new());
        let store = Arc::new(InMemoryStateStore::new());
        let dispatcher = ActionDispatcher::new(
            Collaborators {
                recipes: recipes.clone(),
                ordering: Arc::new(FlakyOrdering::reliable()),
                email: Arc::new(RecordingEmail::reliable()),
            },
            Duration::from_secs(1),
        );
        let agent = CookingAgent::new(
            store,
            Arc::new(RuleFactExtractor::new()),
            Arc::new(DecisionEngine::new()),
            dispatcher,
        );

        let report = agent.handle_turn("s1", Some("beef wellington")).await.unwrap();
        assert_eq!(awaiting(&report), Some(SessionField::DishName));
        assert!(report.messages[0].contains("don't have a recipe"));
        assert!(agent.snapshot("s1").await.unwrap().unwrap().dish_name.is_none());

        let report = agent.handle_turn("s1", Some("pasta carbonara")).await.unwrap();
        assert_eq!(awaiting(&report), Some(SessionField::PantryItems));
        assert_eq!(recipes.calls(), 2);
    }

    #[tokio::test]
    async fn test_email_failures_stall_then_resume() {
        let harness = Harness::new(0, 3);
        let agent = harness.agent().with_limits(3, 16);

        agent.handle_turn("s1", Some("chicken curry")).await.unwrap();
        agent.handle_turn("s1", Some("chicken, onion, ginger")).await.unwrap();
        let report = agent.handle_turn("s1", Some("cook@example.com")).await.unwrap();
        assert_eq!(
            report.status,
            TurnStatus::Stalled {
                action: ActionKind::SendConfirmationEmail,
                attempts: 3
            }
        );
        let state = agent.snapshot("s1").await.unwrap().unwrap();
        assert!(state.order_id.is_some());
        assert!(!state.email_sent);

        let report = agent.handle_turn("s1", None).await.unwrap();
        assert_eq!(report.status, TurnStatus::Completed);
        assert_eq!(harness.ordering.calls(), 1);
        assert_eq!(harness.email.calls(), 4);
    }

    #[tokio::test]
    async fn test_unanswered_question_is_asked_again() {
        let harness = Harness::new(0, 0);
        let agent = harness.agent();

        agent.handle_turn("s1", Some("chicken curry")).await.unwrap();
        agent.handle_turn("s1", Some("chicken, onion, ginger")).await.unwrap();
        let report = agent.handle_turn("s1", Some("not telling you")).await.unwrap();
        assert_eq!(awaiting(&report), Some(SessionField::UserEmail));
        assert_eq!(harness.ordering.calls(), 0);
    }

    #[tokio::test]
    async fn test_turn_count_only_grows() {
        let harness = Harness::new(0, 0);
        let agent = harness.agent();

        let mut last = 0;
        for input in [None, Some("chicken curry"), Some("nothing"), Some("cook@example.com")] {
            agent.handle_turn("s1", input).await.unwrap();
            let count = agent.snapshot("s1").await.unwrap().unwrap().turn_count;
            assert!(count > last);
            last = count;
        }
    }

    #[tokio::test]
    async fn test_session_resumes_in_a_new_agent() {
        let dir = tempfile::tempdir().unwrap();
        let harness = Harness::new(0, 0);
        let agent_with_store = |store: Arc<JsonFileStateStore>| {
            let dispatcher = ActionDispatcher::new(
                Collaborators {
                    recipes: harness.recipes.clone(),
                    ordering: harness.ordering.clone(),
                    email: harness.email.clone(),
                },
                Duration::from_secs(1),
            );
            CookingAgent::new(
                store,
                Arc::new(RuleFactExtractor::new()),
                Arc::new(DecisionEngine::new()),
                dispatcher,
            )
        };

        let first = agent_with_store(Arc::new(JsonFileStateStore::new(dir.path())));
        first.handle_turn("s1", Some("chicken curry")).await.unwrap();
        drop(first);

        let second = agent_with_store(Arc::new(JsonFileStateStore::new(dir.path())));
        let report = second.handle_turn("s1", None).await.unwrap();
        assert_eq!(awaiting(&report), Some(SessionField::PantryItems));
        assert_eq!(harness.recipes.calls(), 1);

        let sessions = second.sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].dish_name.as_deref(), Some("chicken curry"));
    }

    #[tokio::test]
    async fn test_cycle_limit_stalls() {
        let harness = Harness::new(0, 0);
        let agent = harness.agent().with_limits(3, 1);

        agent.handle_turn("s1", Some("chicken curry")).await.unwrap();
        let report = agent.handle_turn("s1", Some("chicken")).await.unwrap();
        assert_eq!(
            report.status,
            TurnStatus::Stalled {
                action: ActionKind::ComputeMissing,
                attempts: 0
            }
        );
    }
}
