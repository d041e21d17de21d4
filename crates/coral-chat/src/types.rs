use chrono::{DateTime, Utc};
use coral_ai::Role;
use serde::{Deserialize, Serialize};

/// One persisted conversation. The title is derived from the first user
/// turn when unset; deleting a session cascades to its turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One message within a session. Role and content are immutable once
/// persisted; turns are destroyed only by the session cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: String,
    pub chat_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A file attached to one submission. Transient: it exists only for the
/// duration of the request and is folded into an image content part, never
/// persisted on its own. `data` is a self-contained base64 data URI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachedFile {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl AttachedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        let data = data.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            mime_type: mime_type.into(),
            size: data.len() as u64,
            data,
            preview: None,
        }
    }
}

/// One session matched by a search query, with the first matching turn's
/// content when the match was on content rather than title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub session_id: String,
    pub session_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_content: Option<String>,
}
