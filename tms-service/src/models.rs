//! Domain data model shared by the core subsystems.
//!
//! All identifiers are opaque strings (`VARCHAR(255)` in storage) so that
//! both 25-character CUIDs and 36-character UUIDs minted upstream can be
//! accepted without translation. All timestamps are `DateTime<Utc>`
//! (`TIMESTAMPTZ` in storage) -- never naive/local.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reflected identity-provider user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub tms_user_id: String,
    pub email: String,
    pub display_name: String,
    pub role: Option<String>,
    pub division: Option<String>,
    pub department: Option<String>,
    pub is_active: bool,
    pub is_leader: bool,
    pub image_url: Option<String>,
    pub last_synced_at: DateTime<Utc>,
    pub settings_json: Option<serde_json::Value>,
}

/// Stored as plain `TEXT` columns, so conversions to/from the wire go
/// through `&str` rather than a native Postgres enum type. Stores read the
/// column as `String` and `.parse()` it; see `conversation_store.rs` /
/// `message_ingest.rs`.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(crate::error::Error::Internal(format!(
                        concat!("unknown ", stringify!($name), ": {}"), other
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(ConversationType { Dm => "DM", Group => "GROUP" });
text_enum!(ConversationRole { Admin => "ADMIN", Member => "MEMBER" });

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub conversation_type: ConversationType,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMember {
    pub conversation_id: String,
    pub user_id: String,
    pub role: ConversationRole,
    pub joined_at: DateTime<Utc>,
    pub last_read_at: Option<DateTime<Utc>>,
    pub is_muted: bool,
    pub mute_until: Option<DateTime<Utc>>,
}

text_enum!(MessageType {
    Text => "TEXT",
    Image => "IMAGE",
    File => "FILE",
    Voice => "VOICE",
    Poll => "POLL",
    Call => "CALL",
    System => "SYSTEM",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: Option<String>,
    pub message_type: MessageType,
    pub metadata: Option<serde_json::Value>,
    pub reply_to_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub is_edited: bool,
}

text_enum!(MessageStatusValue { Sent => "SENT", Delivered => "DELIVERED", Read => "READ" });

impl MessageStatusValue {
    /// Monotonic rank used to reject status regressions (READ can't move
    /// back to DELIVERED, etc).
    pub fn rank(&self) -> u8 {
        match self {
            Self::Sent => 0,
            Self::Delivered => 1,
            Self::Read => 2,
        }
    }
}

impl PartialOrd for MessageStatusValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.rank().cmp(&other.rank()))
    }
}

impl Ord for MessageStatusValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageStatus {
    pub message_id: String,
    pub recipient_id: String,
    pub status: MessageStatusValue,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReaction {
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBlock {
    pub blocker_id: String,
    pub blocked_id: String,
    pub created_at: DateTime<Utc>,
}

/// Scope of a delete-message request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeleteScope {
    /// Hide for the requesting user only; the row survives for everyone else.
    Me,
    /// Tombstone the message for every member (sender-only, within window).
    Everyone,
}

/// Edit window for text messages: a sender may revise content up to 15
/// minutes after `created_at`.
pub const EDIT_WINDOW_SECS: i64 = 15 * 60;

/// Delete-for-everyone window: a sender may tombstone a message up to 60
/// minutes after `created_at`.
pub const DELETE_EVERYONE_WINDOW_SECS: i64 = 60 * 60;

/// Default staleness TTL before a locally reflected user is re-synced.
pub const USER_STALENESS_SECS: i64 = 24 * 60 * 60;

pub const MAX_TEXT_CONTENT_LEN: usize = 10_000;
pub const MIN_GROUP_MEMBERS: usize = 2;
pub const MAX_GROUP_MEMBERS: usize = 256;
