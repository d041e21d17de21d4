//! Persisted chat sessions over provider-agnostic streaming.

mod catalog;
mod error;
mod memory;
mod normalize;
mod service;
mod store;
mod types;

pub use catalog::{models, models_for, resolve_model, ProviderModel, DEFAULT_MODEL, DEFAULT_PROVIDER};
pub use error::ChatError;
pub use memory::MemoryStore;
pub use normalize::normalize_turn;
pub use service::{ChatService, Submission, SubmitRequest};
pub use store::{ChatStore, StoreError};
pub use types::{AttachedFile, ChatSession, SearchHit, Turn};
