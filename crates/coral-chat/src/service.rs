use std::sync::Arc;

use coral_ai::{
    stream_turn, AdapterRegistry, AdapterSource, ProviderCredentials, Role, StreamChunk,
    TurnStream,
};
use tracing::{info, warn};

use crate::catalog::{resolve_model, DEFAULT_MODEL, DEFAULT_PROVIDER};
use crate::error::ChatError;
use crate::normalize::normalize_turn;
use crate::store::ChatStore;
use crate::types::{AttachedFile, ChatSession, SearchHit, Turn};

const DEFAULT_SESSION_TITLE: &str = "New Chat";
const TITLE_MAX_CHARS: usize = 50;
const SEARCH_RESULT_CAP: usize = 20;
const FALLBACK_REPLY: &str = "Sorry, I couldn't process your request. Please try again.";

/// One chat submission.
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub chat_id: String,
    pub user_text: String,
    pub attachments: Vec<AttachedFile>,
    pub provider_id: Option<String>,
    pub model_id: Option<String>,
}

impl SubmitRequest {
    pub fn text(chat_id: impl Into<String>, user_text: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            user_text: user_text.into(),
            ..Self::default()
        }
    }
}

/// Session operations plus the streaming submission pipeline: normalize,
/// persist the user turn, stream through the selected adapter, and
/// reconcile the finished (or failed) stream back into storage.
pub struct ChatService<S> {
    store: Arc<S>,
    adapters: Arc<dyn AdapterSource>,
}

impl<S: ChatStore> ChatService<S> {
    pub fn new(store: Arc<S>, adapters: Arc<dyn AdapterSource>) -> Self {
        Self { store, adapters }
    }

    /// Convenience constructor wiring the built-in provider registry.
    pub fn with_credentials(store: Arc<S>, credentials: ProviderCredentials) -> Self {
        Self::new(store, Arc::new(AdapterRegistry::new(credentials)))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn create_session(&self, title: Option<&str>) -> Result<ChatSession, ChatError> {
        let title = title
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(DEFAULT_SESSION_TITLE);
        Ok(self.store.create_session(title).await?)
    }

    pub async fn sessions(&self) -> Result<Vec<ChatSession>, ChatError> {
        Ok(self.store.sessions().await?)
    }

    pub async fn session_with_turns(
        &self,
        session_id: &str,
    ) -> Result<(Option<ChatSession>, Vec<Turn>), ChatError> {
        let session = self.store.session(session_id).await?;
        let turns = self.store.turns(session_id).await?;
        Ok((session, turns))
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<(), ChatError> {
        Ok(self.store.delete_session(session_id).await?)
    }

    /// Flips the pin flag and returns its new state.
    pub async fn toggle_pin(&self, session_id: &str) -> Result<bool, ChatError> {
        let session = self
            .store
            .session(session_id)
            .await?
            .ok_or_else(|| ChatError::SessionNotFound {
                id: session_id.to_string(),
            })?;
        let pinned = !session.pinned;
        self.store.set_pinned(session_id, pinned).await?;
        Ok(pinned)
    }

    /// Case-insensitive substring search over session titles and turn
    /// contents; first matching turn wins, at most 20 hits.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ChatError> {
        let term = query.trim().to_lowercase();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = Vec::new();
        for session in self.store.sessions().await? {
            let title_match = session.title.to_lowercase().contains(&term);
            let matched_content = self
                .store
                .turns(&session.id)
                .await?
                .into_iter()
                .find(|turn| turn.content.to_lowercase().contains(&term))
                .map(|turn| turn.content);

            if title_match || matched_content.is_some() {
                hits.push(SearchHit {
                    session_id: session.id,
                    session_title: session.title,
                    matched_content,
                });
                if hits.len() == SEARCH_RESULT_CAP {
                    break;
                }
            }
        }
        Ok(hits)
    }

    pub async fn add_turn(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Turn, ChatError> {
        Ok(self.store.insert_turn(session_id, role, content).await?)
    }

    pub async fn save_assistant_turn(
        &self,
        session_id: &str,
        content: &str,
    ) -> Result<Turn, ChatError> {
        Ok(self
            .store
            .insert_turn(session_id, Role::Assistant, content)
            .await?)
    }

    /// Submits one user turn and returns a pull-driven [`Submission`].
    ///
    /// Validation failures reject before anything is persisted or any
    /// adapter is constructed. Otherwise the user turn is persisted up
    /// front (deriving the session title on the first turn), and the
    /// assistant turn is reconciled when the returned stream finishes.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Submission<S>, ChatError> {
        let provider_id = request
            .provider_id
            .as_deref()
            .unwrap_or(DEFAULT_PROVIDER)
            .to_string();
        let model_id = request
            .model_id
            .as_deref()
            .unwrap_or(DEFAULT_MODEL)
            .to_string();

        let model = resolve_model(&provider_id, &model_id);
        let history = self.store.turns(&request.chat_id).await?;
        let messages = normalize_turn(&history, &request.user_text, &request.attachments, model)?;

        self.store
            .insert_turn(&request.chat_id, Role::User, &request.user_text)
            .await?;
        if history.is_empty() {
            let title = truncate_title(&request.user_text);
            self.store.update_title(&request.chat_id, &title).await?;
        }

        info!(
            chat_id = %request.chat_id,
            provider = %provider_id,
            model = %model_id,
            attachments = request.attachments.len(),
            "submitting turn"
        );

        let adapter = self.adapters.adapter(&provider_id, &model_id)?;
        let stream = stream_turn(adapter, messages);

        Ok(Submission {
            store: Arc::clone(&self.store),
            chat_id: request.chat_id,
            stream,
            state: SubmissionState::Streaming,
            assistant_turn: None,
        })
    }
}

enum SubmissionState {
    Streaming,
    Finished,
}

/// One in-flight submission: the uniform chunk sequence plus the
/// reconciliation that runs when it ends.
///
/// `next` yields content snapshots; at end of stream the assistant turn is
/// persisted with the final accumulated content, and a mid-stream adapter
/// failure is converted into a persisted fallback turn rather than an
/// error. Store failures propagate.
pub struct Submission<S> {
    store: Arc<S>,
    chat_id: String,
    stream: TurnStream,
    state: SubmissionState,
    assistant_turn: Option<Turn>,
}

impl<S: ChatStore> Submission<S> {
    pub async fn next(&mut self) -> Result<Option<StreamChunk>, ChatError> {
        if matches!(self.state, SubmissionState::Finished) {
            return Ok(None);
        }

        match self.stream.next().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(error)) => {
                warn!(chat_id = %self.chat_id, error = %error, "stream failed; persisting fallback turn");
                self.state = SubmissionState::Finished;
                let turn = self
                    .store
                    .insert_turn(&self.chat_id, Role::Assistant, FALLBACK_REPLY)
                    .await?;
                self.assistant_turn = Some(turn);
                Ok(None)
            }
            None => {
                self.state = SubmissionState::Finished;
                let content = self.stream.final_content().to_string();
                let turn = self
                    .store
                    .insert_turn(&self.chat_id, Role::Assistant, &content)
                    .await?;
                self.assistant_turn = Some(turn);
                Ok(None)
            }
        }
    }

    /// Drives the stream to completion and returns the persisted assistant
    /// turn.
    pub async fn finish(mut self) -> Result<Turn, ChatError> {
        while self.next().await?.is_some() {}
        self.assistant_turn.take().ok_or_else(|| {
            ChatError::Store(crate::store::StoreError::new(
                "submission finished without a persisted assistant turn",
            ))
        })
    }

    /// The assistant turn persisted at end of stream, once reconciled.
    pub fn assistant_turn(&self) -> Option<&Turn> {
        self.assistant_turn.as_ref()
    }
}

fn truncate_title(user_text: &str) -> String {
    user_text.chars().take(TITLE_MAX_CHARS).collect()
}
