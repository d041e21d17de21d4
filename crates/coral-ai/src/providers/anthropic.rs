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
use crate::types::{ChatMessage, ContentPart, MessageContent};

const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
// The messages API requires an explicit output cap.
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub(crate) struct AnthropicAdapter {
    model: String,
    api_key: String,
    base_url: String,
}

pub(crate) fn adapter(
    model: &str,
    config: &ProviderConfig,
) -> Result<Box<dyn StreamingAdapter>, AiError> {
    let api_key = config.require_key("anthropic", "ANTHROPIC_API_KEY")?;
    Ok(Box::new(AnthropicAdapter {
        model: model.to_string(),
        api_key,
        base_url: config.base_url_or(DEFAULT_ANTHROPIC_BASE_URL),
    }))
}

impl StreamingAdapter for AnthropicAdapter {
    fn provider(&self) -> &str {
        "anthropic"
    }

    fn stream(self: Box<Self>, messages: Vec<ChatMessage>, sink: ChunkSink) -> AdapterFuture {
        Box::pin(async move { run_messages(*self, messages, sink).await })
    }
}

async fn run_messages(
    adapter: AnthropicAdapter,
    messages: Vec<ChatMessage>,
    sink: ChunkSink,
) -> Result<(), AiError> {
    let payload = build_messages_payload(&adapter.model, &messages)?;
    let endpoint = join_url(&adapter.base_url, "messages");
    let client = shared_http_client(&adapter.base_url);

    debug!(model = %adapter.model, "dispatching anthropic messages request");

    let response = client
        .post(endpoint.as_str())
        .header("x-api-key", adapter.api_key.as_str())
        .header("anthropic-version", ANTHROPIC_VERSION)
        .header("content-type", "application/json")
        .json(&payload)
        .send()
        .await
        .map_err(|error| transport_error("Anthropic", error))?;

    if !response.status().is_success() {
        return Err(http_error("Anthropic", response).await);
    }

    let mut body = response.bytes_stream();
    let mut parser = SseParser::new();
    let mut transcript = String::new();

    while let Some(chunk) = body.next().await {
        let bytes = chunk.map_err(|error| read_error("Anthropic", error))?;
        for data in parser.feed(&bytes) {
            match apply_event(&data, &mut transcript, &sink)? {
                EventOutcome::Continue => {}
                EventOutcome::Finished => return Ok(()),
                EventOutcome::Cancelled => return Ok(()),
            }
        }
    }

    if let Some(data) = parser.finish() {
        let _ = apply_event(&data, &mut transcript, &sink)?;
    }

    Ok(())
}

#[derive(Debug)]
enum EventOutcome {
    Continue,
    Finished,
    Cancelled,
}

fn apply_event(
    data: &str,
    transcript: &mut String,
    sink: &ChunkSink,
) -> Result<EventOutcome, AiError> {
    let event: Value = serde_json::from_str(data).map_err(|error| {
        AiError::new(
            AiErrorCode::ProviderProtocol,
            format!("Invalid Anthropic SSE event: {error}"),
        )
        .with_details(json!({ "event": data }))
    })?;
    let event_type = event.get("type").and_then(Value::as_str).ok_or_else(|| {
        AiError::new(
            AiErrorCode::ProviderProtocol,
            "Anthropic event missing `type` field",
        )
        .with_details(json!({ "event": event }))
    })?;

    match event_type {
        "message_start" => {
            if let Some(usage) = event
                .get("message")
                .and_then(Value::as_object)
                .and_then(|message| message.get("usage"))
            {
                sink.metadata(json!({ "usage": usage }));
            }
        }
        "content_block_delta" => {
            let delta_text = event
                .get("delta")
                .and_then(Value::as_object)
                .filter(|delta| delta.get("type").and_then(Value::as_str) == Some("text_delta"))
                .and_then(|delta| delta.get("text"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if !delta_text.is_empty() {
                transcript.push_str(delta_text);
                if !sink.content(transcript.clone()) {
                    return Ok(EventOutcome::Cancelled);
                }
            }
        }
        "message_delta" => {
            if let Some(stop_reason) = event
                .get("delta")
                .and_then(Value::as_object)
                .and_then(|delta| delta.get("stop_reason"))
            {
                sink.metadata(json!({ "stopReason": stop_reason }));
            }
            if let Some(usage) = event.get("usage") {
                sink.metadata(json!({ "usage": usage }));
            }
        }
        "message_stop" => return Ok(EventOutcome::Finished),
        "error" => {
            return Err(AiError::new(
                AiErrorCode::ProviderProtocol,
                "Anthropic stream reported an error",
            )
            .with_details(json!({ "event": event })));
        }
        // content_block_start / content_block_stop / ping and any future
        // event kinds carry no content progress.
        _ => {}
    }

    if sink.is_closed() {
        return Ok(EventOutcome::Cancelled);
    }
    Ok(EventOutcome::Continue)
}

fn build_messages_payload(model: &str, messages: &[ChatMessage]) -> Result<Value, AiError> {
    let converted = messages
        .iter()
        .map(convert_message)
        .collect::<Result<Vec<_>, AiError>>()?;
    Ok(json!({
        "model": model,
        "stream": true,
        "max_tokens": DEFAULT_MAX_TOKENS,
        "messages": converted,
    }))
}

fn convert_message(message: &ChatMessage) -> Result<Value, AiError> {
    match &message.content {
        MessageContent::Text(text) => Ok(json!({
            "role": message.role.as_str(),
            "content": text,
        })),
        MessageContent::Parts(parts) => {
            let converted = parts
                .iter()
                .map(convert_part)
                .collect::<Result<Vec<_>, AiError>>()?;
            Ok(json!({
                "role": message.role.as_str(),
                "content": converted,
            }))
        }
    }
}

fn convert_part(part: &ContentPart) -> Result<Value, AiError> {
    match part {
        ContentPart::Text { text } => Ok(json!({
            "type": "text",
            "text": text,
        })),
        ContentPart::Image { source_url, .. } => {
            let (media_type, data) = split_data_url(source_url)?;
            Ok(json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": media_type,
                    "data": data,
                },
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn payload_splits_image_data_uris_into_base64_sources() {
        let messages = vec![ChatMessage::parts(
            Role::User,
            vec![
                ContentPart::text("describe"),
                ContentPart::image("data:image/jpeg;base64,QUJD"),
            ],
        )];
        let payload = build_messages_payload("claude-sonnet-4-5", &messages)
            .expect("payload should build");

        assert_eq!(payload["max_tokens"], DEFAULT_MAX_TOKENS);
        let parts = payload["messages"][0]["content"]
            .as_array()
            .expect("part array");
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["source"]["type"], "base64");
        assert_eq!(parts[1]["source"]["media_type"], "image/jpeg");
        assert_eq!(parts[1]["source"]["data"], "QUJD");
    }

    #[test]
    fn payload_rejects_non_data_uri_attachments() {
        let messages = vec![ChatMessage::parts(
            Role::User,
            vec![ContentPart::image("https://example.com/cat.png")],
        )];
        let error = build_messages_payload("claude-sonnet-4-5", &messages)
            .expect_err("remote URL should be rejected");
        assert_eq!(error.code, AiErrorCode::ProviderProtocol);
    }

    #[tokio::test]
    async fn text_deltas_accumulate_into_snapshots() {
        let (mut stream, sink) = crate::stream::test_pair();
        let mut transcript = String::new();

        for event in [
            r#"{"type":"message_start","message":{"usage":{"input_tokens":4}}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":" there"}}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"}}"#,
        ] {
            assert!(matches!(
                apply_event(event, &mut transcript, &sink).expect("event applies"),
                EventOutcome::Continue
            ));
        }
        assert!(matches!(
            apply_event(r#"{"type":"message_stop"}"#, &mut transcript, &sink)
                .expect("stop applies"),
            EventOutcome::Finished
        ));
        drop(sink);

        let mut snapshots = Vec::new();
        while let Some(item) = stream.next().await {
            let crate::types::StreamChunk::Content { content } =
                item.expect("no stream error");
            snapshots.push(content);
        }
        assert_eq!(snapshots, vec!["Hi".to_string(), "Hi there".to_string()]);
    }

    #[test]
    fn upstream_error_events_become_protocol_errors() {
        let (_stream, sink) = crate::stream::test_pair();
        let mut transcript = String::new();
        let error = apply_event(
            r#"{"type":"error","error":{"type":"overloaded_error"}}"#,
            &mut transcript,
            &sink,
        )
        .expect_err("error event should fail the stream");
        assert_eq!(error.code, AiErrorCode::ProviderProtocol);
    }
}
