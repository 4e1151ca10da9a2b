use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::infra::llm::ChatCompletionClient;
use crate::services::LanguageModelService;

/// Explicitly constructed dependencies for one front end.
#[derive(Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub language_model: Arc<dyn LanguageModelService>,
}

impl AppContext {
    pub fn new(config: AppConfig, language_model: Arc<dyn LanguageModelService>) -> Self {
        Self {
            config,
            language_model,
        }
    }

    /// Wires the chat-completion client described by `config`.
    pub fn from_config(config: AppConfig) -> AppResult<Self> {
        let mut client = ChatCompletionClient::new(
            config.api_key.clone(),
            config.endpoint.clone(),
            config.model.clone(),
        )
        .with_max_diff_chars(config.max_diff_chars);

        if let Some(timeout) = config.request_timeout {
            client = client.with_timeout(timeout)?;
        }
        if let Some(temperature) = config.temperature {
            client = client.with_temperature(temperature);
        }
        if let Some(max_tokens) = config.max_tokens {
            client = client.with_max_tokens(max_tokens);
        }

        Ok(Self::new(config, Arc::new(client)))
    }
}
