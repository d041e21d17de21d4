use futures_util::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use super::common::{
    http_error, join_url, read_error, shared_http_client, transport_error, SseParser,
};
use crate::config::ProviderConfig;
use crate::error::{AiError, AiErrorCode};
use crate::registry::{AdapterFuture, StreamingAdapter};
use crate::stream::ChunkSink;
use crate::types::{ChatMessage, ContentPart, MessageContent};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Streaming client for the OpenAI chat-completions wire protocol.
///
/// Also serves OpenAI-compatible providers (grok) under their own identity.
pub(crate) struct OpenAiAdapter {
    provider: &'static str,
    model: String,
    api_key: String,
    base_url: String,
}

pub(crate) fn adapter(
    model: &str,
    config: &ProviderConfig,
) -> Result<Box<dyn StreamingAdapter>, AiError> {
    let api_key = config.require_key("openai", "OPENAI_API_KEY")?;
    Ok(Box::new(OpenAiAdapter {
        provider: "openai",
        model: model.to_string(),
        api_key,
        base_url: config.base_url_or(DEFAULT_OPENAI_BASE_URL),
    }))
}

pub(crate) fn compat_adapter(
    provider: &'static str,
    model: &str,
    api_key: String,
    base_url: String,
) -> Box<dyn StreamingAdapter> {
    Box::new(OpenAiAdapter {
        provider,
        model: model.to_string(),
        api_key,
        base_url,
    })
}

impl StreamingAdapter for OpenAiAdapter {
    fn provider(&self) -> &str {
        self.provider
    }

    fn stream(self: Box<Self>, messages: Vec<ChatMessage>, sink: ChunkSink) -> AdapterFuture {
        Box::pin(async move { run_chat_completions(*self, messages, sink).await })
    }
}

async fn run_chat_completions(
    adapter: OpenAiAdapter,
    messages: Vec<ChatMessage>,
    sink: ChunkSink,
) -> Result<(), AiError> {
    let provider = adapter.provider;
    let payload = build_chat_payload(&adapter.model, &messages);
    let endpoint = join_url(&adapter.base_url, "chat/completions");
    let client = shared_http_client(&adapter.base_url);

    debug!(provider, model = %adapter.model, "dispatching chat completion");

    let response = client
        .post(endpoint.as_str())
        .header("Authorization", format!("Bearer {}", adapter.api_key))
        .header("Content-Type", "application/json")
        .json(&payload)
        .send()
        .await
        .map_err(|error| transport_error(provider, error))?;

    if !response.status().is_success() {
        return Err(http_error(provider, response).await);
    }

    let mut body = response.bytes_stream();
    let mut parser = SseParser::new();
    let mut transcript = String::new();

    while let Some(chunk) = body.next().await {
        let bytes = chunk.map_err(|error| read_error(provider, error))?;
        for data in parser.feed(&bytes) {
            if data == "[DONE]" {
                return Ok(());
            }
            if !apply_chunk(provider, &data, &mut transcript, &sink)? {
                // Consumer went away; stop reading the upstream body.
                return Ok(());
            }
        }
    }

    if let Some(data) = parser.finish() {
        if data != "[DONE]" {
            apply_chunk(provider, &data, &mut transcript, &sink)?;
        }
    }

    Ok(())
}

/// Applies one SSE data payload; returns `false` once the sink is closed.
fn apply_chunk(
    provider: &str,
    data: &str,
    transcript: &mut String,
    sink: &ChunkSink,
) -> Result<bool, AiError> {
    let chunk: Value = serde_json::from_str(data).map_err(|error| {
        AiError::new(
            AiErrorCode::ProviderProtocol,
            format!("Invalid {provider} chunk JSON: {error}"),
        )
        .with_details(json!({ "chunk": data }))
    })?;

    if let Some(error) = chunk.get("error") {
        return Err(AiError::new(
            AiErrorCode::ProviderProtocol,
            format!("{provider} stream reported an error"),
        )
        .with_details(json!({ "error": error })));
    }

    if let Some(usage) = chunk.get("usage") {
        if !usage.is_null() {
            sink.metadata(json!({ "usage": usage }));
        }
    }

    let Some(choice) = chunk
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
    else {
        return Ok(!sink.is_closed());
    };

    if let Some(finish_reason) = choice.get("finish_reason").and_then(Value::as_str) {
        sink.metadata(json!({ "finishReason": finish_reason }));
    }

    if let Some(delta) = choice
        .get("delta")
        .and_then(|delta| delta.get("content"))
        .and_then(Value::as_str)
    {
        if !delta.is_empty() {
            transcript.push_str(delta);
            return Ok(sink.content(transcript.clone()));
        }
    }

    Ok(!sink.is_closed())
}

fn build_chat_payload(model: &str, messages: &[ChatMessage]) -> Value {
    json!({
        "model": model,
        "stream": true,
        "messages": messages.iter().map(convert_message).collect::<Vec<_>>(),
    })
}

fn convert_message(message: &ChatMessage) -> Value {
    match &message.content {
        MessageContent::Text(text) => json!({
            "role": message.role.as_str(),
            "content": text,
        }),
        MessageContent::Parts(parts) => {
            let converted = parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => json!({
                        "type": "text",
                        "text": text,
                    }),
                    ContentPart::Image { source_url, detail } => json!({
                        "type": "image_url",
                        "image_url": {
                            "url": source_url,
                            "detail": detail,
                        }
                    }),
                })
                .collect::<Vec<_>>();
            json!({
                "role": message.role.as_str(),
                "content": converted,
            })
        }
    }
}
