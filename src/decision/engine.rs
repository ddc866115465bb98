

use async_trait::async_trait;
use tracing::debug;

use super::models::{Action, Decision};
use crate::session::SessionState;


/// Anything that picks the next action for a session snapshot.
#[async_trait]
pub trait ActionSelector: Send + Sync {
    async fn select(&self, state: &SessionState) -> Decision;

    fn name(&self) -> &str;
}


/// The priority ladder. First unmet precondition wins; no I/O, no hidden state.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionEngine;

impl DecisionEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn decide(&self, state: &SessionState) -> Decision {
        let decision = ladder(state);
        debug!(
            "Ladder picked {} (turn_count={}): {}",
            decision.kind(),
            state.turn_count,
            decision.reasoning
        );
        decision
    }
}

#[async_trait]
impl ActionSelector for DecisionEngine {
    async fn select(&self, state: &SessionState) -> Decision {
        self.decide(state)
    }

    fn name(&self) -> &str {
        "ladder"
    }
}

fn ladder(state: &SessionState) -> Decision {
    let Some(dish_name) = &state.dish_name else {
        return Decision::new(Action::RequestDishName, "No dish chosen yet.");
    };

    if state.recipe.is_none() {
        return Decision::new(
            Action::FetchRecipe {
                dish_name: dish_name.clone(),
            },
            format!("Recipe for '{dish_name}' not fetched yet."),
        );
    }

    if state.pantry_items.is_none() {
        return Decision::new(Action::RequestPantryItems, "Pantry contents unknown.");
    }

    let Some(missing) = &state.missing_ingredients else {
        return Decision::new(
            Action::ComputeMissing,
            "Recipe and pantry known; missing ingredients not computed.",
        );
    };

    if !missing.is_empty() {
        let Some(user_email) = &state.user_email else {
            return Decision::new(
                Action::RequestEmail,
                format!("{} ingredient(s) must be ordered; no email for the confirmation.", missing.len()),
            );
        };

        let Some(order_id) = &state.order_id else {
            return Decision::new(
                Action::PlaceOrder {
                    items: missing.clone(),
                },
                format!("{} ingredient(s) missing and not ordered.", missing.len()),
            );
        };

        if !state.email_sent {
            return Decision::new(
                Action::SendConfirmationEmail {
                    to: user_email.clone(),
                    order_id: order_id.clone(),
                },
                format!("Order {order_id} placed but not confirmed by email."),
            );
        }
    }

    Decision::new(Action::PresentRecipe, "All ingredients secured.")
}
