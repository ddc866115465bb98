

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::core::error::{MiseError, Result};
use crate::utils::normalize_name;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, IntoStaticStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionField {
    DishName,
    PantryItems,
    UserEmail,
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub ingredients: Vec<String>,
    pub steps: Vec<String>,
}


/// Structured facts pulled out of one utterance. Absent means "not mentioned".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dish_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pantry_items: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

impl FactUpdate {
    pub fn is_empty(&self) -> bool {
        self.dish_name.is_none() && self.pantry_items.is_none() && self.user_email.is_none()
    }

    pub fn fields(&self) -> Vec<SessionField> {
        let mut fields = Vec::new();
        if self.dish_name.is_some() {
            fields.push(SessionField::DishName);
        }
        if self.pantry_items.is_some() {
            fields.push(SessionField::PantryItems);
        }
        if self.user_email.is_some() {
            fields.push(SessionField::UserEmail);
        }
        fields
    }
}


#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub dish_name: Option<String>,
    #[serde(default)]
    pub recipe: Option<Recipe>,
    #[serde(default)]
    pub pantry_items: Option<BTreeSet<String>>,
    #[serde(default)]
    pub missing_ingredients: Option<BTreeSet<String>>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub email_sent: bool,
    #[serde(default)]
    pub turn_count: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Done when nothing had to be ordered, or the order went out and was confirmed.
    pub fn is_terminal(&self) -> bool {
        if self.recipe.is_none() {
            return false;
        }
        match &self.missing_ingredients {
            Some(missing) if missing.is_empty() => true,
            Some(_) => self.order_id.is_some() && self.email_sent,
            None => false,
        }
    }

    pub fn needs_order(&self) -> bool {
        self.missing_ingredients
            .as_ref()
            .is_some_and(|missing| !missing.is_empty())
    }

    /// User-supplied fields that are still unset, in ladder order.
    pub fn unset_input_fields(&self) -> Vec<SessionField> {
        let mut fields = Vec::new();
        if self.dish_name.is_none() {
            fields.push(SessionField::DishName);
        }
        if self.pantry_items.is_none() {
            fields.push(SessionField::PantryItems);
        }
        if self.user_email.is_none() {
            fields.push(SessionField::UserEmail);
        }
        fields
    }

    /// Folds extracted facts in. Only unset fields are filled; returns what changed.
    pub fn apply_facts(&mut self, update: &FactUpdate) -> Vec<SessionField> {
        let mut applied = Vec::new();

        if let (None, Some(dish)) = (&self.dish_name, &update.dish_name) {
            let dish = dish.trim();
            if !dish.is_empty() {
                self.dish_name = Some(dish.to_string());
                applied.push(SessionField::DishName);
            }
        }
        if let (None, Some(items)) = (&self.pantry_items, &update.pantry_items) {
            let items: BTreeSet<String> = items
                .iter()
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect();
            self.pantry_items = Some(items);
            applied.push(SessionField::PantryItems);
        }
        if let (None, Some(email)) = (&self.user_email, &update.user_email) {
            let email = email.trim();
            if !email.is_empty() {
                self.user_email = Some(email.to_string());
                applied.push(SessionField::UserEmail);
            }
        }

        applied
    }

    pub fn set_recipe(&mut self, recipe: Recipe) {
        debug_assert!(self.dish_name.is_some(), "recipe set before dish_name");
        debug_assert!(self.recipe.is_none(), "recipe set twice");
        self.recipe = Some(recipe);
    }

    /// The one permitted un-set: an unknown dish sends the ladder back to step 1.
    pub fn reject_dish(&mut self) -> Option<String> {
        debug_assert!(self.recipe.is_none(), "dish rejected after recipe was fetched");
        self.dish_name.take()
    }

    /// Runs the set difference and stores it. Returns the stored set.
    pub fn compute_missing(&mut self) -> Result<&BTreeSet<String>> {
        let (Some(recipe), Some(pantry)) = (&self.recipe, &self.pantry_items) else {
            return Err(MiseError::invariant(
                "missing_ingredients needs both recipe and pantry_items",
            ));
        };
        let missing = missing_ingredients(&recipe.ingredients, pantry);
        Ok(self.missing_ingredients.insert(missing))
    }

    pub fn record_order(&mut self, order_id: impl Into<String>) {
        debug_assert!(self.order_id.is_none(), "order placed twice");
        self.order_id = Some(order_id.into());
    }

    pub fn mark_email_sent(&mut self) {
        debug_assert!(self.order_id.is_some(), "email_sent without order_id");
        self.email_sent = true;
    }

    pub fn check_invariants(&self) -> Result<()> {
        if self.recipe.is_some() && self.dish_name.is_none() {
            return Err(MiseError::invariant("recipe is set but dish_name is not"));
        }

        if let Some(missing) = &self.missing_ingredients {
            let (Some(recipe), Some(pantry)) = (&self.recipe, &self.pantry_items) else {
                return Err(MiseError::invariant(
                    "missing_ingredients is set without recipe and pantry_items",
                ));
            };
            let expected = missing_ingredients(&recipe.ingredients, pantry);
            if normalized(missing) != normalized(&expected) {
                return Err(MiseError::invariant(format!(
                    "missing_ingredients {:?} does not match recipe minus pantry {:?}",
                    missing, expected
                )));
            }
        }

        if self.order_id.is_some() && (!self.needs_order() || self.user_email.is_none()) {
            return Err(MiseError::invariant(
                "order_id is set without missing ingredients and user_email",
            ));
        }

        if self.email_sent && self.order_id.is_none() {
            return Err(MiseError::invariant("email_sent is true without order_id"));
        }

        Ok(())
    }

    /// True when every fact held by `earlier` is still held, unchanged, by `self`.
    pub fn extends(&self, earlier: &SessionState) -> bool {
        fn kept<T: PartialEq>(now: &Option<T>, before: &Option<T>) -> bool {
            before.is_none() || now == before
        }

        kept(&self.dish_name, &earlier.dish_name)
            && kept(&self.recipe, &earlier.recipe)
            && kept(&self.pantry_items, &earlier.pantry_items)
            && kept(&self.missing_ingredients, &earlier.missing_ingredients)
            && kept(&self.user_email, &earlier.user_email)
            && kept(&self.order_id, &earlier.order_id)
            && (self.email_sent || !earlier.email_sent)
            && self.turn_count >= earlier.turn_count
    }
}

/// Recipe ingredients not covered by the pantry. Matching is exact after
/// lowercasing and whitespace collapsing; the recipe's spelling is kept.
pub fn missing_ingredients<S: AsRef<str>>(
    ingredients: &[String],
    pantry: impl IntoIterator<Item = S>,
) -> BTreeSet<String> {
    let have: HashSet<String> = pantry
        .into_iter()
        .map(|item| normalize_name(item.as_ref()))
        .collect();

    let mut seen = HashSet::new();
    ingredients
        .iter()
        .filter(|ingredient| {
            let key = normalize_name(ingredient);
            !key.is_empty() && !have.contains(&key) && seen.insert(key)
        })
        .map(|ingredient| ingredient.trim().to_string())
        .collect()
}

fn normalized(set: &BTreeSet<String>) -> BTreeSet<String> {
    set.iter().map(|item| normalize_name(item)).collect()
}
