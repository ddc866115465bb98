

pub mod extractor;
pub mod factory;
pub mod providers;

pub use extractor::{FactExtractor, LlmFactExtractor, RuleFactExtractor};
pub use factory::LlmProviderFactory;
pub use providers::{LlmMetadata, LlmProvider, LlmProviderError};
