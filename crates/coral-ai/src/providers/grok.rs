use super::openai;
use crate::config::ProviderConfig;
use crate::error::AiError;
use crate::registry::StreamingAdapter;

const DEFAULT_GROK_BASE_URL: &str = "https://api.x.ai/v1";

/// Grok speaks the OpenAI chat-completions wire protocol; this is the same
/// client under the x.ai identity and credential.
pub(crate) fn adapter(
    model: &str,
    config: &ProviderConfig,
) -> Result<Box<dyn StreamingAdapter>, AiError> {
    let api_key = config.require_key("grok", "XAI_API_KEY")?;
    Ok(openai::compat_adapter(
        "grok",
        model,
        api_key,
        config.base_url_or(DEFAULT_GROK_BASE_URL),
    ))
}
