use futures_util::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use super::common::{
    http_error, join_url, read_error, shared_http_client, split_data_url, transport_error,
    SseParser,
};
use crate::config::ProviderConfig;
use crate::error::{AiError, AiErrorCode};
use crate::registry::{AdapterFuture, StreamingAdapter};
use crate::stream::ChunkSink;
use crate::types::{ChatMessage, ContentPart, MessageContent, Role};

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub(crate) struct GeminiAdapter {
    model: String,
    api_key: String,
    base_url: String,
}

pub(crate) fn adapter(
    model: &str,
    config: &ProviderConfig,
) -> Result<Box<dyn StreamingAdapter>, AiError> {
    let api_key = config.require_key("gemini", "GEMINI_API_KEY")?;
    Ok(Box::new(GeminiAdapter {
        model: model.to_string(),
        api_key,
        base_url: config.base_url_or(DEFAULT_GEMINI_BASE_URL),
    }))
}

impl StreamingAdapter for GeminiAdapter {
    fn provider(&self) -> &str {
        "gemini"
    }

    fn stream(self: Box<Self>, messages: Vec<ChatMessage>, sink: ChunkSink) -> AdapterFuture {
        Box::pin(async move { run_generate_content(*self, messages, sink).await })
    }
}

async fn run_generate_content(
    adapter: GeminiAdapter,
    messages: Vec<ChatMessage>,
    sink: ChunkSink,
) -> Result<(), AiError> {
    let payload = build_generate_payload(&messages)?;
    let endpoint = join_url(
        &adapter.base_url,
        &format!("models/{}:streamGenerateContent?alt=sse", adapter.model),
    );
    let client = shared_http_client(&adapter.base_url);

    debug!(model = %adapter.model, "dispatching gemini generate request");

    let response = client
        .post(endpoint.as_str())
        .header("x-goog-api-key", adapter.api_key.as_str())
        .header("Content-Type", "application/json")
        .json(&payload)
        .send()
        .await
        .map_err(|error| transport_error("Gemini", error))?;

    if !response.status().is_success() {
        return Err(http_error("Gemini", response).await);
    }

    let mut body = response.bytes_stream();
    let mut parser = SseParser::new();
    let mut transcript = String::new();

    while let Some(chunk) = body.next().await {
        let bytes = chunk.map_err(|error| read_error("Gemini", error))?;
        for data in parser.feed(&bytes) {
            if data == "[DONE]" {
                return Ok(());
            }
            if !apply_chunk(&data, &mut transcript, &sink)? {
                return Ok(());
            }
        }
    }

    if let Some(data) = parser.finish() {
        if data != "[DONE]" {
            apply_chunk(&data, &mut transcript, &sink)?;
        }
    }

    Ok(())
}

/// Applies one streamed generation chunk; returns `false` once the sink is
/// closed.
fn apply_chunk(data: &str, transcript: &mut String, sink: &ChunkSink) -> Result<bool, AiError> {
    let chunk: Value = serde_json::from_str(data).map_err(|error| {
        AiError::new(
            AiErrorCode::ProviderProtocol,
            format!("Invalid Gemini chunk JSON: {error}"),
        )
        .with_details(json!({ "chunk": data }))
    })?;

    if let Some(error) = chunk.get("error") {
        return Err(AiError::new(
            AiErrorCode::ProviderProtocol,
            "Gemini stream reported an error",
        )
        .with_details(json!({ "error": error })));
    }

    if let Some(usage) = chunk
        .get("usageMetadata")
        .or_else(|| chunk.get("usage_metadata"))
    {
        sink.metadata(json!({ "usage": usage }));
    }

    let Some(candidate) = chunk
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
    else {
        return Ok(!sink.is_closed());
    };

    if let Some(finish_reason) = candidate.get("finishReason").and_then(Value::as_str) {
        sink.metadata(json!({ "finishReason": finish_reason }));
    }

    let mut appended = false;
    if let Some(parts) = candidate
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
    {
        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                if !text.is_empty() {
                    transcript.push_str(text);
                    appended = true;
                }
            }
        }
    }

    if appended {
        return Ok(sink.content(transcript.clone()));
    }
    Ok(!sink.is_closed())
}

fn build_generate_payload(messages: &[ChatMessage]) -> Result<Value, AiError> {
    let contents = messages
        .iter()
        .map(convert_message)
        .collect::<Result<Vec<_>, AiError>>()?;
    Ok(json!({ "contents": contents }))
}

fn convert_message(message: &ChatMessage) -> Result<Value, AiError> {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "model",
    };
    let parts = match &message.content {
        MessageContent::Text(text) => vec![json!({ "text": text })],
        MessageContent::Parts(parts) => parts
            .iter()
            .map(convert_part)
            .collect::<Result<Vec<_>, AiError>>()?,
    };
    Ok(json!({ "role": role, "parts": parts }))
}

fn convert_part(part: &ContentPart) -> Result<Value, AiError> {
    match part {
        ContentPart::Text { text } => Ok(json!({ "text": text })),
        ContentPart::Image { source_url, .. } => {
            let (mime_type, data) = split_data_url(source_url)?;
            Ok(json!({
                "inline_data": {
                    "mime_type": mime_type,
                    "data": data,
                }
            }))
        }
    }
}
