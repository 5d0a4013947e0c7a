pub mod providers;

use std::sync::Arc;

use switchyard_core::config::ModelConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::traits::ModelClient;

pub use providers::anthropic::AnthropicClient;
pub use providers::openai::OpenAiClient;

/// Create a model client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Result<Arc<dyn ModelClient>> {
    match config.provider.as_str() {
        "anthropic" | "claude" => Ok(Arc::new(AnthropicClient::new(config.clone()))),
        "openai" | "ollama" | "groq" | "openrouter" | "vllm" => {
            Ok(Arc::new(OpenAiClient::new(config.clone())))
        }
        other => Err(SwitchyardError::UnsupportedProvider(other.to_string())),
    }
}
