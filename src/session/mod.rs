

pub mod state;
pub mod store;

pub use state::{missing_ingredients, FactUpdate, Recipe, SessionField, SessionState};
pub use store::{
    InMemoryStateStore, JsonFileStateStore, SessionRecord, SessionSummary, StateStore,
    SCHEMA_VERSION,
};
