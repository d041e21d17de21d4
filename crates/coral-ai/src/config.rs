use std::env;

use crate::error::{AiError, AiErrorCode};

/// Credentials and base-URL overrides for one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl ProviderConfig {
    pub fn with_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: None,
        }
    }

    pub(crate) fn require_key(&self, provider: &str, env_hint: &str) -> Result<String, AiError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ => Err(AiError::new(
                AiErrorCode::ProviderAuthMissing,
                format!("Missing API key for provider '{provider}'. Set {env_hint} or supply ProviderConfig.api_key."),
            )),
        }
    }

    pub(crate) fn base_url_or(&self, default: &str) -> String {
        match self.base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => default.to_string(),
        }
    }
}

/// Process-wide provider configuration, read once at startup and threaded
/// into the adapter registry. Ollama takes neither a credential nor an
/// override, so it has no entry here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub openai: ProviderConfig,
    pub anthropic: ProviderConfig,
    pub gemini: ProviderConfig,
    pub grok: ProviderConfig,
}

impl ProviderCredentials {
    pub fn from_env() -> Self {
        Self {
            openai: provider_from_env("OPENAI_API_KEY", "OPENAI_BASE_URL"),
            anthropic: provider_from_env("ANTHROPIC_API_KEY", "ANTHROPIC_BASE_URL"),
            gemini: provider_from_env("GEMINI_API_KEY", "GEMINI_BASE_URL"),
            grok: provider_from_env("XAI_API_KEY", "XAI_BASE_URL"),
        }
    }
}

fn provider_from_env(key_var: &str, base_url_var: &str) -> ProviderConfig {
    ProviderConfig {
        api_key: non_empty_env(key_var),
        base_url: non_empty_env(base_url_var),
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
