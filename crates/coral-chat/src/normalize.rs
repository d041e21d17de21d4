use coral_ai::{ChatMessage, ContentPart, Role};

use crate::catalog::ProviderModel;
use crate::error::ChatError;
use crate::types::{AttachedFile, Turn};

/// Converts one submission (prior turns + new text + attachments) into the
/// provider-agnostic message list the adapters consume. Performs no I/O.
///
/// With no attachments the list stays plain-text; with attachments on a
/// vision-capable model every turn is re-encoded in content-part form, the
/// new turn carrying its text part first and one image part per attachment
/// in submission order. Attachments against a non-vision model are a
/// validation failure, surfaced before any adapter is constructed.
pub fn normalize_turn(
    history: &[Turn],
    user_text: &str,
    attachments: &[AttachedFile],
    model: Option<&ProviderModel>,
) -> Result<Vec<ChatMessage>, ChatError> {
    if user_text.trim().is_empty() {
        return Err(ChatError::EmptyMessage);
    }

    // An uncataloged model gets the safe default: no vision support.
    let supports_vision = model.is_some_and(|entry| entry.supports_vision);
    if !attachments.is_empty() && !supports_vision {
        return Err(ChatError::UnsupportedAttachment {
            provider: model.map(|entry| entry.provider).unwrap_or("unknown").to_string(),
            model: model.map(|entry| entry.id).unwrap_or("unknown").to_string(),
        });
    }

    // Empty or whitespace-only turns never reach an adapter.
    let prior = history
        .iter()
        .filter(|turn| !turn.content.trim().is_empty());

    let mut messages: Vec<ChatMessage> = if attachments.is_empty() {
        prior
            .map(|turn| ChatMessage::text(turn.role, turn.content.clone()))
            .collect()
    } else {
        prior
            .map(|turn| {
                ChatMessage::parts(turn.role, vec![ContentPart::text(turn.content.clone())])
            })
            .collect()
    };

    if attachments.is_empty() {
        messages.push(ChatMessage::text(Role::User, user_text));
    } else {
        let mut parts = Vec::with_capacity(attachments.len() + 1);
        parts.push(ContentPart::text(user_text));
        parts.extend(
            attachments
                .iter()
                .map(|file| ContentPart::image(file.data.clone())),
        );
        messages.push(ChatMessage::parts(Role::User, parts));
    }

    messages.retain(|message| !message.content.is_empty());
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::resolve_model;
    use chrono::Utc;
    use coral_ai::{ImageDetail, MessageContent};

    fn turn(role: Role, content: &str) -> Turn {
        Turn {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: "chat-1".to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    fn png(name: &str) -> AttachedFile {
        AttachedFile::new(name, "image/png", format!("data:image/png;base64,{name}"))
    }

    #[test]
    fn empty_user_text_is_rejected() {
        let result = normalize_turn(&[], "   \n", &[], resolve_model("openai", "gpt-4o-mini"));
        assert_eq!(result, Err(ChatError::EmptyMessage));
    }

    #[test]
    fn attachments_on_a_non_vision_model_are_rejected() {
        let model = resolve_model("openai", "gpt-3.5-turbo");
        let error = normalize_turn(&[], "look at this", &[png("a")], model)
            .expect_err("non-vision model must reject attachments");
        assert!(matches!(error, ChatError::UnsupportedAttachment { .. }));
    }

    #[test]
    fn attachments_on_an_uncataloged_model_are_rejected() {
        let error = normalize_turn(&[], "look at this", &[png("a")], None)
            .expect_err("unknown model defaults to no vision");
        assert!(matches!(error, ChatError::UnsupportedAttachment { .. }));
    }

    #[test]
    fn plain_text_mode_keeps_string_content_and_drops_empty_turns() {
        let history = vec![
            turn(Role::User, "first"),
            turn(Role::Assistant, "   "),
            turn(Role::Assistant, "reply"),
        ];
        let messages = normalize_turn(
            &history,
            "next",
            &[],
            resolve_model("openai", "gpt-4o-mini"),
        )
        .expect("plain submission normalizes");

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, MessageContent::Text("first".into()));
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, MessageContent::Text("reply".into()));
        assert_eq!(messages[2].role, Role::User);
        assert_eq!(messages[2].content, MessageContent::Text("next".into()));
    }

    #[test]
    fn multimodal_mode_re_encodes_history_as_single_text_parts() {
        let history = vec![
            turn(Role::User, "earlier"),
            turn(Role::Assistant, ""),
            turn(Role::Assistant, "answer"),
        ];
        let messages = normalize_turn(
            &history,
            "and this?",
            &[png("a")],
            resolve_model("openai", "gpt-4o"),
        )
        .expect("multimodal submission normalizes");

        assert_eq!(messages.len(), 3);
        for message in &messages[..2] {
            let MessageContent::Parts(parts) = &message.content else {
                panic!("history must be part-encoded in multimodal mode");
            };
            assert_eq!(parts.len(), 1);
            assert!(matches!(parts[0], ContentPart::Text { .. }));
        }
    }

    #[test]
    fn new_turn_is_text_part_first_then_images_in_submission_order() {
        let attachments = vec![png("one"), png("two"), png("three")];
        let messages = normalize_turn(
            &[],
            "caption these",
            &attachments,
            resolve_model("anthropic", "claude-sonnet-4-5"),
        )
        .expect("multimodal submission normalizes");

        let MessageContent::Parts(parts) = &messages[0].content else {
            panic!("new turn must be part-encoded");
        };
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], ContentPart::text("caption these"));
        for (part, file) in parts[1..].iter().zip(&attachments) {
            let ContentPart::Image { source_url, detail } = part else {
                panic!("expected an image part");
            };
            assert_eq!(source_url, &file.data);
            assert_eq!(*detail, ImageDetail::High);
        }
    }
}
