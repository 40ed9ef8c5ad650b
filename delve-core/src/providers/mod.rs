//! LLM provider implementations.
//!
//! Use `create_provider()` to instantiate the configured provider.

pub mod openai_compat;

use crate::brain::LlmProvider;
use crate::config::DelveConfig;
use crate::error::LlmError;
use std::sync::Arc;
use tracing::info;

pub use openai_compat::OpenAiCompatibleProvider;

/// Create the streaming provider described by `config`.
///
/// The clarifier's model is the provider default; every stage still names
/// its own model on each request.
pub fn create_provider(config: &DelveConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = OpenAiCompatibleProvider::new(&config.provider, &config.clarifier.model)?;
    info!(base_url = %config.provider.base_url, "Using OpenAI-compatible provider");
    Ok(Arc::new(provider))
}
