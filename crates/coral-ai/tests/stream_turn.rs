use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use coral_ai::{
    stream_turn, AdapterFuture, AiError, AiErrorCode, ChatMessage, ChunkSink, Role, StreamChunk,
    StreamingAdapter,
};
use serde_json::json;

/// Adapter that replays a fixed script of snapshots and metadata, optionally
/// failing partway through.
struct ScriptedAdapter {
    snapshots: Vec<&'static str>,
    fail_after: Option<usize>,
}

impl StreamingAdapter for ScriptedAdapter {
    fn provider(&self) -> &str {
        "scripted"
    }

    fn stream(self: Box<Self>, _messages: Vec<ChatMessage>, sink: ChunkSink) -> AdapterFuture {
        Box::pin(async move {
            sink.metadata(json!({ "usage": { "input": 3 } }));
            for (index, snapshot) in self.snapshots.iter().enumerate() {
                if self.fail_after == Some(index) {
                    return Err(AiError::new(
                        AiErrorCode::ProviderTransport,
                        "connection reset mid-stream",
                    ));
                }
                sink.content(*snapshot);
            }
            sink.metadata(json!({ "finishReason": "stop" }));
            Ok(())
        })
    }
}

fn user_message() -> Vec<ChatMessage> {
    vec![ChatMessage::text(Role::User, "hello")]
}

#[tokio::test]
async fn forwards_content_and_absorbs_metadata() {
    let adapter = Box::new(ScriptedAdapter {
        snapshots: vec!["He", "Hell", "Hello!"],
        fail_after: None,
    });
    let mut stream = stream_turn(adapter, user_message());

    let mut contents = Vec::new();
    while let Some(item) = stream.next().await {
        let StreamChunk::Content { content } = item.expect("scripted stream should succeed");
        contents.push(content);
    }

    assert_eq!(contents, vec!["He", "Hell", "Hello!"]);
    assert_eq!(stream.final_content(), "Hello!");
}

#[tokio::test]
async fn snapshot_lengths_are_non_decreasing() {
    let adapter = Box::new(ScriptedAdapter {
        snapshots: vec!["a", "ab", "ab", "abcd"],
        fail_after: None,
    });
    let mut stream = stream_turn(adapter, user_message());

    let mut previous_len = 0;
    while let Some(item) = stream.next().await {
        let StreamChunk::Content { content } = item.expect("scripted stream should succeed");
        assert!(content.len() >= previous_len, "snapshot shrank: {content}");
        previous_len = content.len();
    }
}

#[tokio::test]
async fn adapter_failure_terminates_with_a_single_error() {
    let adapter = Box::new(ScriptedAdapter {
        snapshots: vec!["partial", "partial answer"],
        fail_after: Some(1),
    });
    let mut stream = stream_turn(adapter, user_message());

    let first = stream.next().await.expect("one chunk before the failure");
    assert!(matches!(first, Ok(StreamChunk::Content { .. })));

    let error = match stream.next().await {
        Some(Err(error)) => error,
        other => panic!("expected stream error, got {other:?}"),
    };
    assert_eq!(error.code, AiErrorCode::ProviderTransport);

    // Chunks already yielded are not retracted and the sequence ends.
    assert!(stream.next().await.is_none());
    assert_eq!(stream.final_content(), "partial");
}

/// Adapter that keeps pushing until the consumer goes away, recording when
/// it observed the closed channel.
struct ChattyAdapter {
    pushed: Arc<AtomicUsize>,
    saw_closed: Arc<AtomicBool>,
}

impl StreamingAdapter for ChattyAdapter {
    fn provider(&self) -> &str {
        "chatty"
    }

    fn stream(self: Box<Self>, _messages: Vec<ChatMessage>, sink: ChunkSink) -> AdapterFuture {
        Box::pin(async move {
            let mut transcript = String::new();
            for _ in 0..10_000 {
                transcript.push('x');
                if !sink.content(transcript.clone()) {
                    self.saw_closed.store(true, Ordering::SeqCst);
                    return Ok(());
                }
                self.pushed.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
            }
            Ok(())
        })
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn dropping_the_stream_cancels_the_producer() {
    let pushed = Arc::new(AtomicUsize::new(0));
    let saw_closed = Arc::new(AtomicBool::new(false));
    let adapter = Box::new(ChattyAdapter {
        pushed: Arc::clone(&pushed),
        saw_closed: Arc::clone(&saw_closed),
    });

    let mut stream = stream_turn(adapter, user_message());
    let first = stream.next().await.expect("producer should yield");
    assert!(first.is_ok());
    drop(stream);

    let mut waited = Duration::ZERO;
    while !saw_closed.load(Ordering::SeqCst) && waited < Duration::from_secs(2) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    assert!(
        saw_closed.load(Ordering::SeqCst),
        "producer never observed the dropped consumer after {} pushes",
        pushed.load(Ordering::SeqCst)
    );
}
