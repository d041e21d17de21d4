use serde::Serialize;

pub const DEFAULT_PROVIDER: &str = "openai";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// One row of the static provider/model capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderModel {
    pub provider: &'static str,
    pub id: &'static str,
    pub name: &'static str,
    pub supports_vision: bool,
    pub supports_document: bool,
}

const fn model(
    provider: &'static str,
    id: &'static str,
    name: &'static str,
    supports_vision: bool,
    supports_document: bool,
) -> ProviderModel {
    ProviderModel {
        provider,
        id,
        name,
        supports_vision,
        supports_document,
    }
}

static MODELS: &[ProviderModel] = &[
    model("openai", "gpt-4o-mini", "GPT-4o Mini", true, false),
    model("openai", "gpt-4o", "GPT-4o", true, false),
    model("openai", "gpt-4-turbo", "GPT-4 Turbo", true, false),
    model("openai", "gpt-3.5-turbo", "GPT-3.5 Turbo", false, false),
    model("anthropic", "claude-sonnet-4-5", "Claude Sonnet 4.5", true, true),
    model("anthropic", "claude-3-5-sonnet-latest", "Claude 3.5 Sonnet", true, true),
    model("anthropic", "claude-3-5-haiku-latest", "Claude 3.5 Haiku", true, false),
    model("gemini", "gemini-pro", "Gemini Pro", true, true),
    model("gemini", "gemini-2.5-flash", "Gemini 2.5 Flash", true, true),
];

/// Pure capability lookup. Callers substitute a safe default (no vision,
/// no document support) when the pair is not in the table.
pub fn resolve_model(provider_id: &str, model_id: &str) -> Option<&'static ProviderModel> {
    MODELS
        .iter()
        .find(|entry| entry.provider == provider_id && entry.id == model_id)
}

pub fn models() -> &'static [ProviderModel] {
    MODELS
}

pub fn models_for(provider_id: &str) -> impl Iterator<Item = &'static ProviderModel> + use<'_> {
    MODELS.iter().filter(move |entry| entry.provider == provider_id)
}
