

pub mod advisor;
pub mod engine;
pub mod models;
pub mod prompt;

pub use advisor::LlmDecisionEngine;
pub use engine::{ActionSelector, DecisionEngine};
pub use models::{Action, ActionKind, Decision};
