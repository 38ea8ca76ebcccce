use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{LlmClient, LlmClientError};
use crate::presentation::config::{LlmProvider, LlmSettings};

use super::{OPENAI_API_BASE, OpenAiChatClient, ReplicateClient};

pub struct LlmClientFactory;

impl LlmClientFactory {
    pub fn create(settings: &LlmSettings) -> Result<Arc<dyn LlmClient>, LlmClientError> {
        let api_key = settings.api_key.clone().filter(|k| !k.is_empty());

        match settings.provider {
            LlmProvider::Replicate => {
                let token = api_key.ok_or_else(|| {
                    LlmClientError::Configuration(
                        "replicate provider requires REPLICATE_API_TOKEN".to_string(),
                    )
                })?;
                tracing::info!(
                    model = %settings.model,
                    version = settings.version.as_deref().unwrap_or("latest"),
                    "Using Replicate LLM"
                );

                let mut client =
                    ReplicateClient::new(token, settings.model.clone(), settings.version.clone())
                        .with_generation(settings.max_new_tokens, settings.temperature)
                        .with_system_prompt(settings.system_prompt.clone())
                        .with_polling(
                            Duration::from_millis(settings.poll_interval_ms),
                            Duration::from_secs(settings.timeout_secs),
                        );
                if let Some(base_url) = &settings.base_url {
                    client = client.with_base_url(base_url.clone());
                }
                Ok(Arc::new(client))
            }
            LlmProvider::OpenAi => {
                let key = api_key.ok_or_else(|| {
                    LlmClientError::Configuration(
                        "openai provider requires OPENAI_API_KEY".to_string(),
                    )
                })?;
                let base_url = settings
                    .base_url
                    .clone()
                    .unwrap_or_else(|| OPENAI_API_BASE.to_string());
                tracing::info!(model = %settings.model, base_url = %base_url, "Using OpenAI LLM");
                Ok(Arc::new(Self::chat_client(settings, base_url, Some(key))))
            }
            LlmProvider::LmStudio => {
                let base_url = settings.base_url.clone().ok_or_else(|| {
                    LlmClientError::Configuration(
                        "base_url required for lmstudio provider".to_string(),
                    )
                })?;
                tracing::info!(
                    model = %settings.model,
                    base_url = %base_url,
                    "Using local OpenAI-compatible LLM"
                );
                Ok(Arc::new(Self::chat_client(settings, base_url, api_key)))
            }
        }
    }

    fn chat_client(
        settings: &LlmSettings,
        base_url: String,
        api_key: Option<String>,
    ) -> OpenAiChatClient {
        OpenAiChatClient::new(
            base_url,
            api_key,
            settings.model.clone(),
            settings.max_new_tokens,
            settings.temperature,
        )
        .with_system_prompt(settings.system_prompt.clone())
        .with_timeout(Duration::from_secs(settings.timeout_secs))
    }
}
