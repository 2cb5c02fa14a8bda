pub mod gateway;
pub mod prompts;
pub mod services;
pub mod types;
pub mod utils;

#[cfg(feature = "openai")]
pub mod client;

pub use gateway::*;
pub use services::*;
pub use types::*;
pub use utils::{parse_json_response, strip_code_fences};

#[cfg(feature = "openai")]
pub use client::*;
