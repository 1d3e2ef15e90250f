//! Chat data model: sessions, messages, and the fixed strings the
//! generation flow writes into them.
//!
//! Messages are append-only within a session; an existing message is only
//! ever patched in place by id. Sessions carrying the restricted sentinel
//! title are display-only state and must never reach durable storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title a session starts with, and the summarization fallback.
pub const DEFAULT_SESSION_TITLE: &str = "Yangi suhbat";

/// Sentinel title marking a restricted session (excluded from persistence
/// and from normal-mode display).
pub const RESTRICTED_SESSION_TITLE: &str = "SECRET_SESSION";

/// Completion notice written into an image placeholder once media arrives.
pub const IMAGE_READY_NOTICE: &str = "Rasm tayyor.";

/// Completion notice written into a video placeholder.
pub const VIDEO_READY_NOTICE: &str = "Video tayyor.";

/// Fixed user-facing text for any failed generation.
pub const GENERATION_FAILED_NOTICE: &str = "Xatolik yuz berdi. Qayta urinib ko'ring.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Model,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Model => "model",
        }
    }
}

/// What kind of output a message carries (or will carry, for placeholders).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
}

/// A single chat message.
///
/// `content` is set once for user messages; for model placeholders it is
/// rewritten (full replacement, never delta-patched) as results arrive.
/// `media_url` is set at most once, when media generation completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: MessageRole::User,
            content: content.into(),
            kind,
            media_url: None,
            timestamp: Utc::now(),
        }
    }

    /// The empty model-authored message created alongside a user message,
    /// before any generation result exists.
    pub fn placeholder(kind: MessageKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: MessageRole::Model,
            content: String::new(),
            kind,
            media_url: None,
            timestamp: Utc::now(),
        }
    }
}

/// Partial update merged into an existing message; unset fields are left
/// untouched. Applying the same patch twice is idempotent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub media_url: Option<String>,
}

impl MessagePatch {
    /// Replace the text body only.
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            media_url: None,
        }
    }

    /// Attach finished media and its completion notice in one update.
    pub fn media_ready(url: impl Into<String>, notice: &str) -> Self {
        Self {
            content: Some(notice.to_string()),
            media_url: Some(url.into()),
        }
    }

    pub fn apply(&self, message: &mut Message) {
        if let Some(content) = &self.content {
            message.content = content.clone();
        }
        if let Some(url) = &self.media_url {
            message.media_url = Some(url.clone());
        }
    }
}

/// A conversation thread. Ordered, append-only message list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(restricted: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: if restricted {
                RESTRICTED_SESSION_TITLE.to_string()
            } else {
                DEFAULT_SESSION_TITLE.to_string()
            },
            messages: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_restricted(&self) -> bool {
        self.title == RESTRICTED_SESSION_TITLE
    }

    /// Append a user message and its response placeholder as one atomic
    /// pair, in order.
    pub fn push_pair(&mut self, user: Message, placeholder: Message) {
        self.messages.push(user);
        self.messages.push(placeholder);
        self.updated_at = Utc::now();
    }

    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_fields() {
        let msg = Message::user("hello", MessageKind::Text);
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.content, "hello");
        assert!(msg.media_url.is_none());
    }

    #[test]
    fn test_placeholder_starts_empty() {
        let msg = Message::placeholder(MessageKind::Video);
        assert_eq!(msg.role, MessageRole::Model);
        assert!(msg.content.is_empty());
        assert_eq!(msg.kind, MessageKind::Video);
    }

    #[test]
    fn test_patch_merges_only_set_fields() {
        let mut msg = Message::placeholder(MessageKind::Image);
        MessagePatch::content("working...").apply(&mut msg);
        assert_eq!(msg.content, "working...");
        assert!(msg.media_url.is_none());

        MessagePatch::media_ready("data:image/png;base64,AAAA", IMAGE_READY_NOTICE).apply(&mut msg);
        assert_eq!(msg.content, IMAGE_READY_NOTICE);
        assert_eq!(msg.media_url.as_deref(), Some("data:image/png;base64,AAAA"));
    }

    #[test]
    fn test_patch_is_idempotent() {
        let mut once = Message::placeholder(MessageKind::Text);
        let mut twice = once.clone();
        let patch = MessagePatch::content("final text");
        patch.apply(&mut once);
        patch.apply(&mut twice);
        patch.apply(&mut twice);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_session_titles() {
        assert_eq!(ChatSession::new(false).title, DEFAULT_SESSION_TITLE);
        let restricted = ChatSession::new(true);
        assert_eq!(restricted.title, RESTRICTED_SESSION_TITLE);
        assert!(restricted.is_restricted());
    }

    #[test]
    fn test_push_pair_keeps_order_and_bumps_updated_at() {
        let mut session = ChatSession::new(false);
        let before = session.updated_at;
        let user = Message::user("draw a cat", MessageKind::Image);
        let placeholder = Message::placeholder(MessageKind::Image);
        let user_id = user.id.clone();
        session.push_pair(user, placeholder);
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].id, user_id);
        assert_eq!(session.messages[1].role, MessageRole::Model);
        assert!(session.updated_at >= before);
    }

    #[test]
    fn test_snapshot_field_names_are_camel_case() {
        let mut session = ChatSession::new(false);
        let mut placeholder = Message::placeholder(MessageKind::Image);
        placeholder.media_url = Some("data:image/png;base64,AA".into());
        session.push_pair(Message::user("p", MessageKind::Image), placeholder);

        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("updatedAt").is_some());
        let media = &json["messages"][1];
        assert_eq!(media["type"], "image");
        assert!(media.get("mediaUrl").is_some());
        assert_eq!(media["role"], "model");
    }
}
