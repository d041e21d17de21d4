use std::fmt::{Display, Formatter};

use coral_ai::AiError;

use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub enum ChatError {
    /// The submitted user text was empty or whitespace-only.
    EmptyMessage,
    /// Attachments were submitted against a model without vision support.
    UnsupportedAttachment { provider: String, model: String },
    SessionNotFound { id: String },
    /// Configuration or upstream failure from the streaming layer.
    Ai(AiError),
    Store(StoreError),
}

impl Display for ChatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatError::EmptyMessage => write!(f, "message content is empty"),
            ChatError::UnsupportedAttachment { provider, model } => write!(
                f,
                "model '{model}' ({provider}) does not support image attachments"
            ),
            ChatError::SessionNotFound { id } => write!(f, "chat session '{id}' not found"),
            ChatError::Ai(error) => write!(f, "{error}"),
            ChatError::Store(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<AiError> for ChatError {
    fn from(error: AiError) -> Self {
        ChatError::Ai(error)
    }
}

impl From<StoreError> for ChatError {
    fn from(error: StoreError) -> Self {
        ChatError::Store(error)
    }
}
