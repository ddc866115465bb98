

use std::collections::HashMap;

use async_trait::async_trait;
use lazy_static::lazy_static;
use tracing::debug;

use super::{CollaboratorError, RecipeLookup, RecipeRequest, RecipeResponse};
use crate::utils::normalize_name;

struct StoredRecipe {
    ingredients: &'static [&'static str],
    steps: &'static [&'static str],
}

lazy_static! {
    static ref RECIPES: HashMap<&'static str, StoredRecipe> = {
        let mut m = HashMap::new();
        m.insert("pasta carbonara", StoredRecipe {
            ingredients: &[
                "spaghetti", "eggs", "pecorino cheese", "guanciale", "black pepper", "salt",
            ],
            steps: &[
                "Bring a large pot of salted water to boil",
                "Cook spaghetti according to package instructions",
                "While pasta cooks, whisk eggs and grated pecorino in a bowl",
                "Crisp guanciale in a pan until golden brown",
                "Drain pasta, reserving some pasta water",
                "Mix pasta with egg mixture and guanciale",
                "Add pasta water if needed to create a creamy sauce",
                "Season with black pepper and serve immediately",
            ],
        });
        m.insert("chicken curry", StoredRecipe {
            ingredients: &[
                "chicken breast", "onion", "garlic", "ginger", "curry powder",
                "coconut milk", "tomatoes", "rice",
            ],
            steps: &[
                "Cut chicken into bite-sized pieces",
                "Dice onion, mince garlic and ginger",
                "Sauté onion until translucent",
                "Add garlic and ginger, cook until fragrant",
                "Add curry powder and stir",
                "Add chicken and cook until browned",
                "Pour in coconut milk and diced tomatoes",
                "Simmer for 20 minutes",
                "Serve over cooked rice",
            ],
        });
        m
    };
}


/// The built-in recipe collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecipeBook;

impl RecipeBook {
    pub fn new() -> Self {
        Self
    }

    /// Known dish names, sorted.
    pub fn dishes(&self) -> Vec<String> {
        let mut dishes: Vec<String> = RECIPES.keys().map(|name| name.to_string()).collect();
        dishes.sort();
        dishes
    }

    pub fn lookup(&self, dish_name: &str) -> RecipeResponse {
        match RECIPES.get(normalize_name(dish_name).as_str()) {
            Some(recipe) => RecipeResponse {
                found: true,
                ingredients: recipe.ingredients.iter().map(|s| s.to_string()).collect(),
                steps: recipe.steps.iter().map(|s| s.to_string()).collect(),
                suggestions: Vec::new(),
            },
            None => RecipeResponse {
                found: false,
                ingredients: Vec::new(),
                steps: Vec::new(),
                suggestions: self.dishes(),
            },
        }
    }
}

#[async_trait]
impl RecipeLookup for RecipeBook {
    async fn get_recipe(&self, request: &RecipeRequest) -> Result<RecipeResponse, CollaboratorError> {
        let response = self.lookup(&request.dish_name);
        debug!("Recipe lookup '{}': found={}", request.dish_name, response.found);
        Ok(response)
    }
}
