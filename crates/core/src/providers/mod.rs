pub mod openai;

pub use openai::{ApiAuth, EndpointConfig, OpenAiChatModel, OpenAiEmbeddings};

use crate::synthesis::Prompt;
use crate::traits::LanguageModel;
use crate::ProviderError;
use async_trait::async_trait;

/// Stands in when no chat endpoint is set; every call fails, which the
/// synthesizer turns into an error-marked answer.
pub struct UnconfiguredModel;

#[async_trait]
impl LanguageModel for UnconfiguredModel {
    async fn generate(&self, _prompt: &Prompt) -> Result<String, ProviderError> {
        Err(ProviderError::Config(
            "no language model endpoint configured".to_string(),
        ))
    }
}
