use std::fmt::{Display, Formatter};

use async_trait::async_trait;
use coral_ai::Role;

use crate::types::{ChatSession, Turn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "store error: {}", self.message)
    }
}

impl std::error::Error for StoreError {}

/// Durable storage collaborator. Implementations own serialization of
/// conflicting writes; no application-level locking happens above this
/// trait. `update_title` and `set_pinned` also bump the session's
/// `updated_at` timestamp.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn create_session(&self, title: &str) -> Result<ChatSession, StoreError>;

    async fn session(&self, session_id: &str) -> Result<Option<ChatSession>, StoreError>;

    /// All sessions, creation time descending.
    async fn sessions(&self) -> Result<Vec<ChatSession>, StoreError>;

    async fn update_title(&self, session_id: &str, title: &str) -> Result<(), StoreError>;

    async fn set_pinned(&self, session_id: &str, pinned: bool) -> Result<(), StoreError>;

    /// Deletes the session and cascades to its turns.
    async fn delete_session(&self, session_id: &str) -> Result<(), StoreError>;

    async fn insert_turn(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Turn, StoreError>;

    /// Turns for one session, creation time ascending.
    async fn turns(&self, session_id: &str) -> Result<Vec<Turn>, StoreError>;
}
