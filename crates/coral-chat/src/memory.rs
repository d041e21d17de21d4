use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use coral_ai::Role;
use uuid::Uuid;

use crate::store::{ChatStore, StoreError};
use crate::types::{ChatSession, Turn};

/// Process-local [`ChatStore`] used by tests and embedders without a
/// database. Conflicting writes serialize on the inner lock. A monotonic
/// sequence keeps ordering stable when timestamps collide.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    seq: u64,
    sessions: Vec<(u64, ChatSession)>,
    turns: Vec<(u64, Turn)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryInner {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn session_mut(&mut self, session_id: &str) -> Result<&mut ChatSession, StoreError> {
        self.sessions
            .iter_mut()
            .map(|(_, session)| session)
            .find(|session| session.id == session_id)
            .ok_or_else(|| StoreError::new(format!("session '{session_id}' not found")))
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn create_session(&self, title: &str) -> Result<ChatSession, StoreError> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let now = Utc::now();
        let session = ChatSession {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            pinned: false,
            created_at: now,
            updated_at: now,
        };
        let seq = inner.next_seq();
        inner.sessions.push((seq, session.clone()));
        Ok(session)
    }

    async fn session(&self, session_id: &str) -> Result<Option<ChatSession>, StoreError> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        Ok(inner
            .sessions
            .iter()
            .map(|(_, session)| session)
            .find(|session| session.id == session_id)
            .cloned())
    }

    async fn sessions(&self) -> Result<Vec<ChatSession>, StoreError> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        let mut rows: Vec<(u64, ChatSession)> = inner.sessions.clone();
        rows.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| seq_b.cmp(seq_a))
        });
        Ok(rows.into_iter().map(|(_, session)| session).collect())
    }

    async fn update_title(&self, session_id: &str, title: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let session = inner.session_mut(session_id)?;
        session.title = title.to_string();
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn set_pinned(&self, session_id: &str, pinned: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let session = inner.session_mut(session_id)?;
        session.pinned = pinned;
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner.sessions.retain(|(_, session)| session.id != session_id);
        inner.turns.retain(|(_, turn)| turn.chat_id != session_id);
        Ok(())
    }

    async fn insert_turn(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Turn, StoreError> {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let turn = Turn {
            id: Uuid::new_v4().to_string(),
            chat_id: session_id.to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let seq = inner.next_seq();
        inner.turns.push((seq, turn.clone()));
        Ok(turn)
    }

    async fn turns(&self, session_id: &str) -> Result<Vec<Turn>, StoreError> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        let mut rows: Vec<(u64, Turn)> = inner
            .turns
            .iter()
            .filter(|(_, turn)| turn.chat_id == session_id)
            .cloned()
            .collect();
        rows.sort_by(|(seq_a, a), (seq_b, b)| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| seq_a.cmp(seq_b))
        });
        Ok(rows.into_iter().map(|(_, turn)| turn).collect())
    }
}
