use futures_util::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use super::common::{
    http_error, join_url, read_error, shared_http_client, split_data_url, transport_error,
    LineParser,
};
use crate::error::{AiError, AiErrorCode};
use crate::registry::{AdapterFuture, StreamingAdapter};
use crate::stream::ChunkSink;
use crate::types::{ChatMessage, ContentPart, MessageContent};

// Local daemon; takes no credential and no base-URL override.
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

pub(crate) struct OllamaAdapter {
    model: String,
}

pub(crate) fn adapter(model: &str) -> Box<dyn StreamingAdapter> {
    Box::new(OllamaAdapter {
        model: model.to_string(),
    })
}

impl StreamingAdapter for OllamaAdapter {
    fn provider(&self) -> &str {
        "ollama"
    }

    fn stream(self: Box<Self>, messages: Vec<ChatMessage>, sink: ChunkSink) -> AdapterFuture {
        Box::pin(async move { run_chat(*self, messages, sink).await })
    }
}

async fn run_chat(
    adapter: OllamaAdapter,
    messages: Vec<ChatMessage>,
    sink: ChunkSink,
) -> Result<(), AiError> {
    let payload = build_chat_payload(&adapter.model, &messages)?;
    let endpoint = join_url(OLLAMA_BASE_URL, "api/chat");
    let client = shared_http_client(OLLAMA_BASE_URL);

    debug!(model = %adapter.model, "dispatching ollama chat request");

    let response = client
        .post(endpoint.as_str())
        .header("Content-Type", "application/json")
        .json(&payload)
        .send()
        .await
        .map_err(|error| transport_error("Ollama", error))?;

    if !response.status().is_success() {
        return Err(http_error("Ollama", response).await);
    }

    let mut body = response.bytes_stream();
    let mut parser = LineParser::new();
    let mut transcript = String::new();

    while let Some(chunk) = body.next().await {
        let bytes = chunk.map_err(|error| read_error("Ollama", error))?;
        for line in parser.feed(&bytes) {
            match apply_line(&line, &mut transcript, &sink)? {
                LineOutcome::Continue => {}
                LineOutcome::Done | LineOutcome::Cancelled => return Ok(()),
            }
        }
    }

    if let Some(line) = parser.finish() {
        let _ = apply_line(&line, &mut transcript, &sink)?;
    }

    Ok(())
}

#[derive(Debug)]
enum LineOutcome {
    Continue,
    Done,
    Cancelled,
}

fn apply_line(line: &str, transcript: &mut String, sink: &ChunkSink) -> Result<LineOutcome, AiError> {
    let chunk: Value = serde_json::from_str(line).map_err(|error| {
        AiError::new(
            AiErrorCode::ProviderProtocol,
            format!("Invalid Ollama chunk JSON: {error}"),
        )
        .with_details(json!({ "chunk": line }))
    })?;

    if let Some(error) = chunk.get("error").and_then(Value::as_str) {
        return Err(AiError::new(
            AiErrorCode::ProviderProtocol,
            format!("Ollama stream reported an error: {error}"),
        ));
    }

    if let Some(delta) = chunk
        .get("message")
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
    {
        if !delta.is_empty() {
            transcript.push_str(delta);
            if !sink.content(transcript.clone()) {
                return Ok(LineOutcome::Cancelled);
            }
        }
    }

    if chunk.get("done").and_then(Value::as_bool) == Some(true) {
        if let Some(eval_count) = chunk.get("eval_count") {
            sink.metadata(json!({ "usage": { "evalCount": eval_count } }));
        }
        return Ok(LineOutcome::Done);
    }

    if sink.is_closed() {
        return Ok(LineOutcome::Cancelled);
    }
    Ok(LineOutcome::Continue)
}

fn build_chat_payload(model: &str, messages: &[ChatMessage]) -> Result<Value, AiError> {
    let converted = messages
        .iter()
        .map(convert_message)
        .collect::<Result<Vec<_>, AiError>>()?;
    Ok(json!({
        "model": model,
        "stream": true,
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
            let mut text_parts = Vec::new();
            let mut images = Vec::new();
            for part in parts {
                match part {
                    ContentPart::Text { text } => text_parts.push(text.as_str()),
                    ContentPart::Image { source_url, .. } => {
                        let (_, data) = split_data_url(source_url)?;
                        images.push(data);
                    }
                }
            }
            let mut converted = json!({
                "role": message.role.as_str(),
                "content": text_parts.join("\n"),
            });
            if !images.is_empty() {
                converted["images"] = json!(images);
            }
            Ok(converted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, StreamChunk};

    #[test]
    fn multimodal_messages_carry_a_raw_base64_image_array() {
        let messages = vec![ChatMessage::parts(
            Role::User,
            vec![
                ContentPart::text("what is this?"),
                ContentPart::image("data:image/png;base64,QQQQ"),
            ],
        )];
        let payload = build_chat_payload("llava", &messages).expect("payload should build");

        assert_eq!(payload["messages"][0]["content"], "what is this?");
        assert_eq!(payload["messages"][0]["images"][0], "QQQQ");
    }

    #[tokio::test]
    async fn ndjson_lines_accumulate_until_done() {
        let (mut stream, sink) = crate::stream::test_pair();
        let mut transcript = String::new();

        assert!(matches!(
            apply_line(
                r#"{"message":{"role":"assistant","content":"Hey"},"done":false}"#,
                &mut transcript,
                &sink,
            )
            .expect("line applies"),
            LineOutcome::Continue
        ));
        assert!(matches!(
            apply_line(
                r#"{"message":{"role":"assistant","content":" you"},"done":false}"#,
                &mut transcript,
                &sink,
            )
            .expect("line applies"),
            LineOutcome::Continue
        ));
        assert!(matches!(
            apply_line(
                r#"{"message":{"role":"assistant","content":""},"done":true,"eval_count":9}"#,
                &mut transcript,
                &sink,
            )
            .expect("line applies"),
            LineOutcome::Done
        ));
        drop(sink);

        let mut snapshots = Vec::new();
        while let Some(item) = stream.next().await {
            let StreamChunk::Content { content } = item.expect("no stream error");
            snapshots.push(content);
        }
        assert_eq!(snapshots, vec!["Hey".to_string(), "Hey you".to_string()]);
    }

    #[test]
    fn upstream_error_lines_fail_the_stream() {
        let (_stream, sink) = crate::stream::test_pair();
        let mut transcript = String::new();
        let error = apply_line(r#"{"error":"model not found"}"#, &mut transcript, &sink)
            .expect_err("error line should fail");
        assert_eq!(error.code, AiErrorCode::ProviderProtocol);
        assert!(error.message.contains("model not found"));
    }
}
