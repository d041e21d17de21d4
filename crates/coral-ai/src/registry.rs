use std::future::Future;
use std::pin::Pin;

use crate::config::ProviderCredentials;
use crate::error::AiError;
use crate::providers;
use crate::stream::ChunkSink;
use crate::types::ChatMessage;

pub type AdapterFuture = Pin<Box<dyn Future<Output = Result<(), AiError>> + Send>>;

/// Uniform streaming contract over one upstream provider's native client.
///
/// An adapter is constructed per request and consumed by its single
/// streaming call.
pub trait StreamingAdapter: Send + Sync {
    fn provider(&self) -> &str;
    fn stream(self: Box<Self>, messages: Vec<ChatMessage>, sink: ChunkSink) -> AdapterFuture;
}

/// Source of per-request adapters; the seam service-level tests substitute.
pub trait AdapterSource: Send + Sync {
    fn adapter(
        &self,
        provider_id: &str,
        model_id: &str,
    ) -> Result<Box<dyn StreamingAdapter>, AiError>;
}

/// Maps provider identifiers to freshly constructed streaming adapters.
///
/// Unrecognized identifiers resolve to the openai adapter — a deliberate
/// permissive default, not an error path. No caching: adapters are
/// stateless with respect to prior turns and built per request.
#[derive(Debug, Clone)]
pub struct AdapterRegistry {
    credentials: ProviderCredentials,
}

impl AdapterRegistry {
    pub fn new(credentials: ProviderCredentials) -> Self {
        Self { credentials }
    }

    pub fn from_env() -> Self {
        Self::new(ProviderCredentials::from_env())
    }
}

impl AdapterSource for AdapterRegistry {
    fn adapter(
        &self,
        provider_id: &str,
        model_id: &str,
    ) -> Result<Box<dyn StreamingAdapter>, AiError> {
        match provider_id {
            "anthropic" => providers::anthropic::adapter(model_id, &self.credentials.anthropic),
            "gemini" => providers::gemini::adapter(model_id, &self.credentials.gemini),
            "ollama" => Ok(providers::ollama::adapter(model_id)),
            "grok" => providers::grok::adapter(model_id, &self.credentials.grok),
            _ => providers::openai::adapter(model_id, &self.credentials.openai),
        }
    }
}
