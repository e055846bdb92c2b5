//! Language-model collaborators for field extraction.
//!
//! - [`OpenRouterClient`]: OpenAI-compatible chat completions over HTTP
//! - [`MockProducer`]: fixed responses, no network

mod mock;
mod openrouter;
pub mod prompt;

pub use mock::MockProducer;
pub use openrouter::OpenRouterClient;
pub use prompt::{SYSTEM_INSTRUCTION, extraction_prompt};
