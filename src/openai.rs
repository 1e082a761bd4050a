//! OpenAI client configuration with sensible defaults.

use crate::error::{ParleyError, Result};
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Default timeout for OpenAI API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Create an OpenAI client with the default timeout.
///
/// The API key comes from `OPENAI_API_KEY`.
pub fn create_client() -> Result<Client<OpenAIConfig>> {
    create_client_with(None, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
}

/// Create an OpenAI client with an optional base URL and a custom timeout.
pub fn create_client_with(api_base: Option<&str>, timeout: Duration) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ParleyError::Config(format!("Failed to create HTTP client: {}", e)))?;

    let mut config = OpenAIConfig::default();
    if let Some(base) = api_base.filter(|b| !b.is_empty()) {
        config = config.with_api_base(base.trim_end_matches('/'));
    }

    Ok(Client::with_config(config).with_http_client(http_client))
}

/// Whether the OpenAI API key is present in the environment.
pub fn is_api_key_configured() -> bool {
    std::env::var("OPENAI_API_KEY")
        .map(|k| !k.is_empty())
        .unwrap_or(false)
}

/// Map an async-openai error, flagging transport failures as transient.
pub fn map_error(context: &str, err: async_openai::error::OpenAIError) -> ParleyError {
    use async_openai::error::OpenAIError;

    let transient = matches!(err, OpenAIError::Reqwest(_));
    ParleyError::OpenAI {
        message: format!("{}: {}", context, err),
        transient,
    }
}
