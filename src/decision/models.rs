

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::session::SessionField;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, IntoStaticStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionKind {
    RequestDishName,
    FetchRecipe,
    RequestPantryItems,
    ComputeMissing,
    RequestEmail,
    PlaceOrder,
    SendConfirmationEmail,
    PresentRecipe,
}

impl ActionKind {
    pub const ALL: [ActionKind; 8] = [
        ActionKind::RequestDishName,
        ActionKind::FetchRecipe,
        ActionKind::RequestPantryItems,
        ActionKind::ComputeMissing,
        ActionKind::RequestEmail,
        ActionKind::PlaceOrder,
        ActionKind::SendConfirmationEmail,
        ActionKind::PresentRecipe,
    ];
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    RequestDishName,
    FetchRecipe { dish_name: String },
    RequestPantryItems,
    ComputeMissing,
    RequestEmail,
    PlaceOrder { items: BTreeSet<String> },
    SendConfirmationEmail { to: String, order_id: String },
    PresentRecipe,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::RequestDishName => ActionKind::RequestDishName,
            Action::FetchRecipe { .. } => ActionKind::FetchRecipe,
            Action::RequestPantryItems => ActionKind::RequestPantryItems,
            Action::ComputeMissing => ActionKind::ComputeMissing,
            Action::RequestEmail => ActionKind::RequestEmail,
            Action::PlaceOrder { .. } => ActionKind::PlaceOrder,
            Action::SendConfirmationEmail { .. } => ActionKind::SendConfirmationEmail,
            Action::PresentRecipe => ActionKind::PresentRecipe,
        }
    }

    /// The field a request action asks the user for.
    pub fn requested_field(&self) -> Option<SessionField> {
        match self {
            Action::RequestDishName => Some(SessionField::DishName),
            Action::RequestPantryItems => Some(SessionField::PantryItems),
            Action::RequestEmail => Some(SessionField::UserEmail),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Action::PresentRecipe)
    }

    /// Crosses into a recipe, ordering or email collaborator.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Action::FetchRecipe { .. }
                | Action::PlaceOrder { .. }
                | Action::SendConfirmationEmail { .. }
        )
    }
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {

    pub action: Action,


    pub reasoning: String,
}

impl Decision {
    pub fn new(action: Action, reasoning: impl Into<String>) -> Self {
        Self {
            action,
            reasoning: reasoning.into(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_kind_round_trips_through_names() {
        for kind in ActionKind::ALL {
            let name: &'static str = kind.into();
            assert_eq!(name.parse::<ActionKind>().unwrap(), kind);
        }
        assert_eq!(ActionKind::SendConfirmationEmail.to_string(), "send_confirmation_email");
    }

    #[test]
    fn test_action_serializes_with_tag() {
        let action = Action::FetchRecipe {
            dish_name: "chicken curry".to_string(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "fetch_recipe");
        assert_eq!(json["dish_name"], "chicken curry");
    }

    #[test]
    fn test_action_classification() {
        assert_eq!(Action::RequestEmail.requested_field(), Some(SessionField::UserEmail));
        assert!(Action::PresentRecipe.is_terminal());
        assert!(!Action::ComputeMissing.is_external());
        assert!(
            Action::PlaceOrder {
                items: BTreeSet::new()
            }
            .is_external()
        );
    }
}
