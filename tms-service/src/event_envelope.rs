//! The canonical wire format for every event the fan-out bus emits.
//!
//! Every event, regardless of type, is wrapped in the same envelope shape:
//! `{event, room, payload, server_time}`. `room` always uses the single
//! canonical key scheme `conversation:<id>` so the fan-out layer and the
//! client agree on room identity without any namespace translation.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical room key for a conversation. Used end-to-end -- by
/// `ConversationStore`, `FanOut`, and every `EventEnvelope` -- so there is
/// exactly one scheme to get wrong.
pub fn conversation_room(conversation_id: &str) -> String {
    format!("conversation:{conversation_id}")
}

/// The set of event kinds the fan-out bus can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    NewMessage,
    MessageEdited,
    MessageDeleted,
    MessageStatus,
    MessagesDelivered,
    ReactionAdded,
    ReactionRemoved,
    TypingStart,
    TypingStop,
    UserOnline,
    UserOffline,
    ConversationUpdated,
    MemberAdded,
    MemberRemoved,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewMessage => "new_message",
            Self::MessageEdited => "message_edited",
            Self::MessageDeleted => "message_deleted",
            Self::MessageStatus => "message_status",
            Self::MessagesDelivered => "messages_delivered",
            Self::ReactionAdded => "reaction_added",
            Self::ReactionRemoved => "reaction_removed",
            Self::TypingStart => "typing_start",
            Self::TypingStop => "typing_stop",
            Self::UserOnline => "user_online",
            Self::UserOffline => "user_offline",
            Self::ConversationUpdated => "conversation_updated",
            Self::MemberAdded => "member_added",
            Self::MemberRemoved => "member_removed",
        }
    }
}

/// `{event, room, payload, server_time}` -- the exact shape put on the wire
/// for every WebSocket broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: String,
    pub room: String,
    pub payload: Value,
    pub server_time: chrono::DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(event: Event, room: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.as_str().to_string(),
            room: room.into(),
            payload,
            server_time: Utc::now(),
        }
    }

    pub fn for_conversation(event: Event, conversation_id: &str, payload: Value) -> Self {
        Self::new(event, conversation_room(conversation_id), payload)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Builders for each payload shape named in the event catalog. These exist
/// to keep field names and required fields in one place rather than
/// scattering `serde_json::json!` calls with slightly different shapes
/// across `message_ingest`, `status_machine`, and `fanout`.
pub mod payloads {
    use super::*;
    use crate::models::Message;

    pub fn new_message(message: &Message, sender_display_name: &str, attachment_urls: &[String]) -> Value {
        serde_json::json!({
            "message": message,
            "senderDisplayName": sender_display_name,
            "attachmentUrls": attachment_urls,
        })
    }

    pub fn message_edited(message_id: &str, new_content: &str, updated_at: chrono::DateTime<Utc>) -> Value {
        serde_json::json!({
            "messageId": message_id,
            "newContent": new_content,
            "updatedAt": updated_at,
            "isEdited": true,
        })
    }

    pub fn message_deleted(message_id: &str, deleted_at: chrono::DateTime<Utc>, scope: &str) -> Value {
        serde_json::json!({
            "messageId": message_id,
            "deletedAt": deleted_at,
            "scope": scope,
        })
    }

    pub fn message_status(message_id: &str, user_id: &str, status: &str) -> Value {
        serde_json::json!({
            "messageId": message_id,
            "userId": user_id,
            "status": status,
        })
    }

    pub fn messages_delivered(conversation_id: &str, user_id: &str, count: u64) -> Value {
        serde_json::json!({
            "conversationId": conversation_id,
            "userId": user_id,
            "count": count,
        })
    }

    pub fn reaction(message_id: &str, user_id: &str, emoji: &str) -> Value {
        serde_json::json!({
            "messageId": message_id,
            "userId": user_id,
            "emoji": emoji,
        })
    }

    pub fn typing(conversation_id: &str, user_id: &str) -> Value {
        serde_json::json!({
            "conversationId": conversation_id,
            "userId": user_id,
        })
    }

    pub fn presence(user_id: &str) -> Value {
        serde_json::json!({ "userId": user_id })
    }

    pub fn member_change(conversation_id: &str, user_id: &str) -> Value {
        serde_json::json!({
            "conversationId": conversation_id,
            "userId": user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_key_is_canonical() {
        assert_eq!(conversation_room("abc-123"), "conversation:abc-123");
    }

    #[test]
    fn envelope_serializes_event_as_snake_case_string() {
        let envelope = EventEnvelope::for_conversation(
            Event::TypingStart,
            "conv-1",
            payloads::typing("conv-1", "user-1"),
        );
        let json = envelope.to_json().unwrap();
        assert!(json.contains("\"event\":\"typing_start\""));
        assert!(json.contains("\"room\":\"conversation:conv-1\""));
    }
}
