

pub mod config;
pub mod error;

pub use config::MiseConfig;
pub use error::{MiseError, Result};
