

pub mod agent;
pub mod collaborators;
pub mod core;
pub mod decision;
pub mod llm;
pub mod mcp;
pub mod session;
pub mod utils;

pub use utils::{safe_truncate, safe_truncate_ellipsis};


pub use agent::{build_agent, CookingAgent, TurnReport, TurnStatus};
pub use core::config::MiseConfig;
pub use core::error::{MiseError, Result};
pub use session::SessionState;


pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";


pub const DEFAULT_LLM_MODEL: &str = "gemini-2.0-flash";


pub const DEFAULT_EMAIL_ENDPOINT: &str = "https://api.resend.com/emails";


pub const DEFAULT_COLLABORATOR_TIMEOUT_SECS: u64 = 30;


pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;


pub const DEFAULT_MAX_CYCLES_PER_TURN: usize = 16;
