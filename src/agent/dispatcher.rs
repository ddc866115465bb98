

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::collaborators::{
    format_order_email, CollaboratorError, EmailRequest, EmailService, OrderRequest,
    OrderingService, RecipeLookup, RecipeRequest,
};
use crate::core::error::{MiseError, Result};
use crate::decision::models::{Action, ActionKind};
use crate::session::{Recipe, SessionField, SessionState};
use crate::utils::normalize_name;


/// The external services one agent talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub recipes: Arc<dyn RecipeLookup>,
    pub ordering: Arc<dyn OrderingService>,
    pub email: Arc<dyn EmailService>,
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Asked the user for a field. State untouched.
    Prompt { field: SessionField, message: String },
    Progressed { message: String },
    /// The recipe service does not know the dish; `dish_name` was cleared.
    DishNotFound { message: String },
    /// A collaborator failed or timed out. State untouched.
    Failed {
        action: ActionKind,
        error: String,
        message: String,
    },
    Presented { rendering: String },
}

impl DispatchOutcome {
    pub fn message(&self) -> &str {
        match self {
            DispatchOutcome::Prompt { message, .. }
            | DispatchOutcome::Progressed { message }
            | DispatchOutcome::DishNotFound { message }
            | DispatchOutcome::Failed { message, .. } => message,
            DispatchOutcome::Presented { rendering } => rendering,
        }
    }
}


pub struct ActionDispatcher {
    collaborators: Collaborators,
    timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(collaborators: Collaborators, timeout: Duration) -> Self {
        Self {
            collaborators,
            timeout,
        }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Executes one action against `state`. Collaborator failures come back as
    /// `Failed`; only broken preconditions are errors.
    pub async fn dispatch(&self, action: &Action, state: &mut SessionState) -> Result<DispatchOutcome> {
        debug!("Dispatching {}", action.kind());

        match action {
            Action::RequestDishName => Ok(DispatchOutcome::Prompt {
                field: SessionField::DishName,
                message: "What would you like to cook today?".to_string(),
            }),
            Action::RequestPantryItems => Ok(DispatchOutcome::Prompt {
                field: SessionField::PantryItems,
                message: "Which of the ingredients do you already have? \
                          List them separated by commas, or say \"nothing\"."
                    .to_string(),
            }),
            Action::RequestEmail => {
                let missing = state
                    .missing_ingredients
                    .iter()
                    .flatten()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ");
                Ok(DispatchOutcome::Prompt {
                    field: SessionField::UserEmail,
                    message: format!(
                        "You're missing: {missing}. I can order them for you. \
                         Which email address should get the order confirmation?"
                    ),
                })
            }
            Action::FetchRecipe { dish_name } => self.fetch_recipe(dish_name, state).await,
            Action::ComputeMissing => {
                let missing = state.compute_missing()?;
                info!("Missing ingredients computed: {:?}", missing);
                let message = if missing.is_empty() {
                    "You have all the required ingredients!".to_string()
                } else {
                    let lines: Vec<String> = missing.iter().map(|item| format!("- {item}")).collect();
                    format!("Missing ingredients:\n{}", lines.join("\n"))
                };
                Ok(DispatchOutcome::Progressed { message })
            }
            Action::PlaceOrder { items } => self.place_order(items, state).await,
            Action::SendConfirmationEmail { to, order_id } => {
                self.send_confirmation(to, order_id, state).await
            }
            Action::PresentRecipe => Ok(DispatchOutcome::Presented {
                rendering: render_recipe(state)?,
            }),
        }
    }

    async fn guarded<T>(
        &self,
        call: impl Future<Output = std::result::Result<T, CollaboratorError>>,
    ) -> std::result::Result<T, CollaboratorError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::Timeout(self.timeout)),
        }
    }

    async fn fetch_recipe(&self, dish_name: &str, state: &mut SessionState) -> Result<DispatchOutcome> {
        let request = RecipeRequest {
            dish_name: dish_name.to_string(),
        };

        let response = match self.guarded(self.collaborators.recipes.get_recipe(&request)).await {
            Ok(response) => response,
            Err(e) => {
                return Ok(failed(
                    ActionKind::FetchRecipe,
                    e,
                    format!("I couldn't reach the recipe service for '{dish_name}'."),
                ));
            }
        };

        if !response.found {
            state.reject_dish();
            info!("No recipe for '{}'", dish_name);
            let mut message = format!("Sorry, I don't have a recipe for '{dish_name}'.");
            if !response.suggestions.is_empty() {
                message.push_str(&format!(" I can help with: {}.", response.suggestions.join(", ")));
            }
            return Ok(DispatchOutcome::DishNotFound { message });
        }

        let count = response.ingredients.len();
        state.set_recipe(Recipe {
            ingredients: response.ingredients,
            steps: response.steps,
        });
        info!("Recipe for '{}' fetched ({} ingredients)", dish_name, count);

        Ok(DispatchOutcome::Progressed {
            message: format!("Found a recipe for {dish_name} with {count} ingredients."),
        })
    }

    async fn place_order(
        &self,
        items: &std::collections::BTreeSet<String>,
        state: &mut SessionState,
    ) -> Result<DispatchOutcome> {
        if let Some(existing) = &state.order_id {
            return Err(MiseError::invariant(format!(
                "PlaceOrder dispatched although order {existing} exists"
            )));
        }

        let request = OrderRequest {
            items: items.clone(),
        };
        match self.guarded(self.collaborators.ordering.place_order(&request)).await {
            Ok(response) => {
                state.record_order(response.order_id.clone());
                Ok(DispatchOutcome::Progressed {
                    message: format!(
                        "Order placed successfully!\nOrder ID: {}\nTotal: ${:.2}",
                        response.order_id, response.total
                    ),
                })
            }
            Err(e) => Ok(failed(
                ActionKind::PlaceOrder,
                e,
                "I couldn't place the grocery order.".to_string(),
            )),
        }
    }

    async fn send_confirmation(
        &self,
        to: &str,
        order_id: &str,
        state: &mut SessionState,
    ) -> Result<DispatchOutcome> {
        let request = EmailRequest {
            to: to.to_string(),
            order_id: order_id.to_string(),
            summary: format_order_email(order_id, state.missing_ingredients.iter().flatten()),
        };

        match self.guarded(self.collaborators.email.send(&request)).await {
            Ok(response) if response.sent => {
                state.mark_email_sent();
                let mut message = format!("Confirmation email sent to {to}.");
                if let Some(id) = response.message_id {
                    message.push_str(&format!("\nMessage ID: {id}"));
                }
                Ok(DispatchOutcome::Progressed { message })
            }
            Ok(_) => Ok(failed(
                ActionKind::SendConfirmationEmail,
                CollaboratorError::Unavailable("email service reported the message as not sent".to_string()),
                format!("The confirmation email to {to} was not sent."),
            )),
            Err(e) => Ok(failed(
                ActionKind::SendConfirmationEmail,
                e,
                format!("Failed to send the confirmation email to {to}."),
            )),
        }
    }
}

fn failed(action: ActionKind, error: CollaboratorError, message: String) -> DispatchOutcome {
    warn!("{} failed: {}", action, error);
    DispatchOutcome::Failed {
        action,
        message: format!("{message} ({error})"),
        error: error.to_string(),
    }
}

/// Final recipe text. Ingredients that went into the order are marked "(ordered)".
pub fn render_recipe(state: &SessionState) -> Result<String> {
    let (Some(dish), Some(recipe)) = (&state.dish_name, &state.recipe) else {
        return Err(MiseError::invariant("PresentRecipe needs dish_name and recipe"));
    };

    let ordered: Vec<String> = match (&state.order_id, &state.missing_ingredients) {
        (Some(_), Some(missing)) => missing.iter().map(|item| normalize_name(item)).collect(),
        _ => Vec::new(),
    };

    let mut out = format!("Recipe: {dish}\n\nIngredients:\n");
    for ingredient in &recipe.ingredients {
        if ordered.contains(&normalize_name(ingredient)) {
            out.push_str(&format!("- {ingredient} (ordered)\n"));
        } else {
            out.push_str(&format!("- {ingredient}\n"));
        }
    }

    out.push_str("\nSteps:\n");
    for (i, step) in recipe.steps.iter().enumerate() {
        out.push_str(&format!("{}. {step}\n", i + 1));
    }

    if let Some(order_id) = &state.order_id {
        out.push_str(&format!("\nOrder ID: {order_id}\n"));
    }

    Ok(out.trim_end().to_string())
}
