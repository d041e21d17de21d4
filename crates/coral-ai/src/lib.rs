//! Provider-agnostic streaming for multi-model chat backends.

mod config;
mod error;
mod providers;
mod registry;
mod stream;
mod types;

pub use config::{ProviderConfig, ProviderCredentials};
pub use error::{AiError, AiErrorCode};
pub use registry::{AdapterFuture, AdapterRegistry, AdapterSource, StreamingAdapter};
pub use stream::{stream_turn, ChunkSink, TurnStream};
pub use types::{
    ChatMessage, ContentPart, ImageDetail, MessageContent, ProviderEvent, Role, StreamChunk,
};
