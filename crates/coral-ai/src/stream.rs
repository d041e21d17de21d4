use tokio::sync::mpsc;

use crate::error::AiError;
use crate::registry::StreamingAdapter;
use crate::types::{ChatMessage, ProviderEvent, StreamChunk};

/// Producer handle adapters push upstream events through.
///
/// `push` returns `false` once the consuming [`TurnStream`] has been
/// dropped; adapters treat that as cancellation and abandon the upstream
/// connection.
pub struct ChunkSink {
    tx: mpsc::UnboundedSender<Result<ProviderEvent, AiError>>,
}

impl ChunkSink {
    pub fn content(&self, text: impl Into<String>) -> bool {
        self.push(ProviderEvent::Content { text: text.into() })
    }

    pub fn metadata(&self, value: serde_json::Value) -> bool {
        self.push(ProviderEvent::Metadata { value })
    }

    pub fn push(&self, event: ProviderEvent) -> bool {
        self.tx.send(Ok(event)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Uniform, single-consumer, pull-driven sequence of content snapshots.
///
/// Only content progress is forwarded; every other event kind an adapter
/// emits is absorbed here. An adapter failure terminates the sequence with
/// exactly one `Err` item; chunks already yielded are never retracted.
pub struct TurnStream {
    rx: mpsc::UnboundedReceiver<Result<ProviderEvent, AiError>>,
    last_content: String,
    failed: bool,
}

impl TurnStream {
    pub async fn next(&mut self) -> Option<Result<StreamChunk, AiError>> {
        if self.failed {
            return None;
        }
        while let Some(item) = self.rx.recv().await {
            match item {
                Ok(ProviderEvent::Content { text }) => {
                    self.last_content = text.clone();
                    return Some(Ok(StreamChunk::Content { content: text }));
                }
                Ok(ProviderEvent::Metadata { .. }) => continue,
                Err(error) => {
                    self.failed = true;
                    self.rx.close();
                    return Some(Err(error));
                }
            }
        }
        None
    }

    /// The payload of the last content chunk seen so far.
    pub fn final_content(&self) -> &str {
        &self.last_content
    }
}

/// Drives `adapter` against `messages` and returns the uniform chunk
/// sequence. The adapter runs as a producer task; the returned stream is
/// the pull side, and dropping it releases the producer.
pub fn stream_turn(adapter: Box<dyn StreamingAdapter>, messages: Vec<ChatMessage>) -> TurnStream {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = ChunkSink { tx: tx.clone() };
    let provider = adapter.provider().to_string();
    spawn_adapter_task(async move {
        if let Err(error) = adapter.stream(messages, sink).await {
            tracing::warn!(provider = %provider, error = %error, "adapter stream failed");
            let _ = tx.send(Err(error));
        }
    });
    TurnStream {
        rx,
        last_content: String::new(),
        failed: false,
    }
}

#[cfg(test)]
pub(crate) fn test_pair() -> (TurnStream, ChunkSink) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        TurnStream {
            rx,
            last_content: String::new(),
            failed: false,
        },
        ChunkSink { tx },
    )
}

fn spawn_adapter_task<F>(task: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(task);
        return;
    }

    std::thread::spawn(move || {
        if let Ok(runtime) = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            runtime.block_on(task);
        }
    });
}
