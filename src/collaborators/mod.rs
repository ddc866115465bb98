

//! Request/response boundaries for the services the dispatcher calls out to.

pub mod delivery;
pub mod email;
pub mod recipes;

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use delivery::{MockDelivery, OrderStatus, OrderStatusReport};
pub use email::{format_order_email, HttpEmailService, UnconfiguredEmailService, ORDER_EMAIL_SUBJECT};
pub use recipes::RecipeBook;


#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}


#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeRequest {
    pub dish_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeResponse {
    pub found: bool,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    /// Known dishes, filled in on a miss.
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub items: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: String,
    #[serde(default)]
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRequest {
    pub to: String,
    pub order_id: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailResponse {
    pub sent: bool,
    #[serde(default)]
    pub message_id: Option<String>,
}


#[async_trait]
pub trait RecipeLookup: Send + Sync {
    async fn get_recipe(&self, request: &RecipeRequest) -> Result<RecipeResponse, CollaboratorError>;
}

#[async_trait]
pub trait OrderingService: Send + Sync {
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResponse, CollaboratorError>;
}

#[async_trait]
pub trait EmailService: Send + Sync {
    async fn send(&self, request: &EmailRequest) -> Result<EmailResponse, CollaboratorError>;

    /// False when the service can never succeed (no credentials).
    fn is_configured(&self) -> bool {
        true
    }
}
