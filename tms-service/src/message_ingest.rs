//! Message ingest: send, edit, delete, and reactions, with per-conversation
//! ordering enforced by a transaction-scoped advisory lock.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::conversation_store::ConversationStore;
use crate::error::{Error, Result};
use crate::models::{
    DeleteScope, Message, MessageReaction, MessageStatus, MessageStatusValue, MessageType,
    DELETE_EVERYONE_WINDOW_SECS, EDIT_WINDOW_SECS, MAX_TEXT_CONTENT_LEN,
};

pub struct SendMessageRequest {
    pub conversation_id: String,
    pub sender_id: String,
    pub content: Option<String>,
    pub message_type: MessageType,
    pub metadata: Option<serde_json::Value>,
    pub reply_to_id: Option<String>,
}

pub struct MessageIngest {
    pool: PgPool,
    conversations: ConversationStore,
}

impl MessageIngest {
    pub fn new(pool: PgPool, conversations: ConversationStore) -> Self {
        Self { pool, conversations }
    }

    /// Send protocol:
    /// 1. verify membership
    /// 2. verify the sender isn't blocked by the DM counterpart
    /// 3. acquire a per-conversation advisory lock, scoped to this
    ///    transaction, so concurrent sends to the same conversation
    ///    serialize (and are released automatically at commit/rollback)
    /// 4. validate content
    /// 5. persist the message row
    /// 6. insert a SENT status row for every other member
    /// 7. bump `conversation.updated_at`
    /// 8. commit (releases the lock)
    /// 9. the caller emits `new_message` after this returns Ok
    pub async fn send(&self, req: SendMessageRequest) -> Result<Message> {
        if !self.conversations.is_member(&req.conversation_id, &req.sender_id).await? {
            return Err(Error::Forbidden("not a member of this conversation".into()));
        }

        self.reject_if_blocked(&req.conversation_id, &req.sender_id).await?;

        self.validate_content(&req)?;

        let mut tx = self.pool.begin().await.map_err(crate::error::DatabaseError::from)?;
        lock_conversation(&mut tx, &req.conversation_id).await?;

        // Re-check membership inside the lock: a racing `remove_member` may
        // have landed between the check above and lock acquisition.
        let still_member: bool = sqlx::query(
            "SELECT 1 FROM conversation_members WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(&req.conversation_id)
        .bind(&req.sender_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(crate::error::DatabaseError::from)?
        .is_some();

        if !still_member {
            return Err(Error::Forbidden("not a member of this conversation".into()));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_id, content, type, metadata, \
             reply_to_id, created_at, updated_at, is_edited) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, false)",
        )
        .bind(&id)
        .bind(&req.conversation_id)
        .bind(&req.sender_id)
        .bind(&req.content)
        .bind(req.message_type.as_str())
        .bind(&req.metadata)
        .bind(&req.reply_to_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        let recipients = sqlx::query(
            "SELECT user_id FROM conversation_members WHERE conversation_id = $1 AND user_id != $2",
        )
        .bind(&req.conversation_id)
        .bind(&req.sender_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        for row in &recipients {
            let recipient_id: String = row.get("user_id");
            sqlx::query(
                "INSERT INTO message_statuses (message_id, recipient_id, status, updated_at) \
                 VALUES ($1, $2, 'SENT', $3)",
            )
            .bind(&id)
            .bind(&recipient_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(crate::error::DatabaseError::from)?;
        }

        sqlx::query("UPDATE conversations SET updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(&req.conversation_id)
            .execute(&mut *tx)
            .await
            .map_err(crate::error::DatabaseError::from)?;

        tx.commit().await.map_err(crate::error::DatabaseError::from)?;

        Ok(Message {
            id,
            conversation_id: req.conversation_id,
            sender_id: req.sender_id,
            content: req.content,
            message_type: req.message_type,
            metadata: req.metadata,
            reply_to_id: req.reply_to_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            is_edited: false,
        })
    }

    fn validate_content(&self, req: &SendMessageRequest) -> Result<()> {
        match req.message_type {
            MessageType::Text => {
                let content = req
                    .content
                    .as_ref()
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| Error::ValidationError("text messages require content".into()))?;
                if content.chars().count() > MAX_TEXT_CONTENT_LEN {
                    return Err(Error::ValidationError(format!(
                        "content exceeds {MAX_TEXT_CONTENT_LEN} characters"
                    )));
                }
            }
            MessageType::Image | MessageType::File | MessageType::Voice => {
                let has_oss_key = req
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("ossKey"))
                    .and_then(|v| v.as_str())
                    .is_some();
                if !has_oss_key {
                    return Err(Error::ValidationError(
                        "attachment messages require metadata.ossKey".into(),
                    ));
                }
            }
            MessageType::Poll => {
                // The adjacent Poll row is validated by the caller (poll
                // state machines are out of scope here); we only require a
                // metadata payload to exist.
                if req.metadata.is_none() {
                    return Err(Error::ValidationError("poll messages require metadata".into()));
                }
            }
            MessageType::Call | MessageType::System => {
                // Server-authored; no client-supplied content constraints.
            }
        }
        Ok(())
    }

    async fn reject_if_blocked(&self, conversation_id: &str, sender_id: &str) -> Result<()> {
        let conversation = self.conversations.get(conversation_id).await?;
        if !matches!(conversation.conversation_type, crate::models::ConversationType::Dm) {
            return Ok(());
        }

        let others = self.conversations.other_member_ids(conversation_id, sender_id).await?;
        let Some(other) = others.first() else { return Ok(()) };

        let blocked: bool = sqlx::query(
            "SELECT 1 FROM user_blocks WHERE blocker_id = $1 AND blocked_id = $2",
        )
        .bind(other)
        .bind(sender_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?
        .is_some();

        if blocked {
            return Err(Error::Forbidden("blocked by recipient".into()));
        }
        Ok(())
    }

    /// Edit a TEXT message's content. Sender-only, within 15 minutes of
    /// `created_at`, and only if not deleted.
    pub async fn edit(&self, message_id: &str, actor: &str, new_content: &str) -> Result<Message> {
        let message = self.get(message_id).await?;

        if message.sender_id != actor {
            return Err(Error::Forbidden("only the sender may edit this message".into()));
        }
        if message.deleted_at.is_some() {
            return Err(Error::Conflict("message has been deleted".into()));
        }
        if !matches!(message.message_type, MessageType::Text) {
            return Err(Error::ValidationError("only text messages can be edited".into()));
        }
        if (Utc::now() - message.created_at).num_seconds() > EDIT_WINDOW_SECS {
            return Err(Error::Forbidden("edit window has elapsed".into()));
        }
        if new_content.trim().is_empty() || new_content.chars().count() > MAX_TEXT_CONTENT_LEN {
            return Err(Error::ValidationError("invalid message content".into()));
        }

        let now = Utc::now();
        sqlx::query(
            "UPDATE messages SET content = $1, updated_at = $2, is_edited = true WHERE id = $3",
        )
        .bind(new_content)
        .bind(now)
        .bind(message_id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        self.get(message_id).await
    }

    /// Delete a message. `Me` hides it client-side for the requester only
    /// (a row in `message_hides`, never broadcast). `Everyone` tombstones
    /// the row for every member: sender-only, within 60 minutes, clears
    /// content and sets `deleted_at`.
    pub async fn delete(&self, message_id: &str, actor: &str, scope: DeleteScope) -> Result<Option<Message>> {
        let message = self.get(message_id).await?;

        match scope {
            DeleteScope::Me => {
                sqlx::query(
                    "INSERT INTO message_hides (message_id, user_id, hidden_at) VALUES ($1, $2, $3) \
                     ON CONFLICT DO NOTHING",
                )
                .bind(message_id)
                .bind(actor)
                .bind(Utc::now())
                .execute(&self.pool)
                .await
                .map_err(crate::error::DatabaseError::from)?;
                Ok(None)
            }
            DeleteScope::Everyone => {
                if message.sender_id != actor {
                    return Err(Error::Forbidden("only the sender may delete this message for everyone".into()));
                }
                if message.deleted_at.is_some() {
                    return Ok(None);
                }
                if (Utc::now() - message.created_at).num_seconds() > DELETE_EVERYONE_WINDOW_SECS {
                    return Err(Error::Forbidden("delete-for-everyone window has elapsed".into()));
                }

                let now = Utc::now();
                sqlx::query(
                    "UPDATE messages SET content = NULL, deleted_at = $1, updated_at = $1 WHERE id = $2",
                )
                .bind(now)
                .bind(message_id)
                .execute(&self.pool)
                .await
                .map_err(crate::error::DatabaseError::from)?;

                self.get(message_id).await.map(Some)
            }
        }
    }

    /// Insert a server-authored SYSTEM message recording an audit event
    /// (delete-for-everyone, member add/remove/leave, rename).
    pub async fn post_system_message(&self, conversation_id: &str, text: &str) -> Result<Message> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_id, content, type, metadata, \
             reply_to_id, created_at, updated_at, is_edited) \
             VALUES ($1, $2, NULL, $3, 'SYSTEM', NULL, NULL, $4, $4, false)",
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(text)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        Ok(Message {
            id,
            conversation_id: conversation_id.to_string(),
            sender_id: String::new(),
            content: Some(text.to_string()),
            message_type: MessageType::System,
            metadata: None,
            reply_to_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            is_edited: false,
        })
    }

    /// Add a reaction. Uniqueness on `(message_id, user_id, emoji)` makes a
    /// duplicate react a no-op rather than an error -- idempotent per the
    /// spec, and it avoids a held row lock the way the antipattern the
    /// conversation-store schema warns against (poll voting) did.
    pub async fn react(&self, message_id: &str, user_id: &str, emoji: &str) -> Result<bool> {
        let inserted = sqlx::query(
            "INSERT INTO message_reactions (message_id, user_id, emoji, created_at) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (message_id, user_id, emoji) DO NOTHING",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(emoji)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        Ok(inserted.rows_affected() > 0)
    }

    pub async fn unreact(&self, message_id: &str, user_id: &str, emoji: &str) -> Result<bool> {
        let deleted = sqlx::query(
            "DELETE FROM message_reactions WHERE message_id = $1 AND user_id = $2 AND emoji = $3",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(emoji)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        Ok(deleted.rows_affected() > 0)
    }

    pub async fn get(&self, message_id: &str) -> Result<Message> {
        let row = sqlx::query(
            "SELECT id, conversation_id, sender_id, content, type, metadata, reply_to_id, \
             created_at, updated_at, deleted_at, is_edited FROM messages WHERE id = $1",
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?
        .ok_or_else(|| Error::NotFound(format!("message {message_id} not found")))?;

        Self::message_from_row(&row)
    }

    /// Cursor-paginated conversation history, newest first, honoring the
    /// requesting user's "delete for me" hide-list at read time.
    pub async fn list_for_conversation(
        &self,
        conversation_id: &str,
        requesting_user: &str,
        cursor: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<Message>> {
        let limit = limit.clamp(1, 200);
        let rows = sqlx::query(
            "SELECT m.id, m.conversation_id, m.sender_id, m.content, m.type, m.metadata, \
             m.reply_to_id, m.created_at, m.updated_at, m.deleted_at, m.is_edited \
             FROM messages m \
             WHERE m.conversation_id = $1 \
               AND ($2::timestamptz IS NULL OR m.created_at < $2) \
               AND NOT EXISTS ( \
                 SELECT 1 FROM message_hides h WHERE h.message_id = m.id AND h.user_id = $3 \
               ) \
             ORDER BY m.created_at DESC \
             LIMIT $4",
        )
        .bind(conversation_id)
        .bind(cursor)
        .bind(requesting_user)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        rows.iter().map(Self::message_from_row).collect()
    }

    pub async fn reactions_for(&self, message_id: &str) -> Result<Vec<MessageReaction>> {
        let rows = sqlx::query(
            "SELECT message_id, user_id, emoji, created_at FROM message_reactions WHERE message_id = $1",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        Ok(rows
            .iter()
            .map(|r| MessageReaction {
                message_id: r.get("message_id"),
                user_id: r.get("user_id"),
                emoji: r.get("emoji"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    pub async fn statuses_for(&self, message_id: &str) -> Result<Vec<MessageStatus>> {
        let rows = sqlx::query(
            "SELECT message_id, recipient_id, status, updated_at FROM message_statuses WHERE message_id = $1",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        rows.iter()
            .map(|r| {
                let status: String = r.get("status");
                Ok(MessageStatus {
                    message_id: r.get("message_id"),
                    recipient_id: r.get("recipient_id"),
                    status: status.parse::<MessageStatusValue>()?,
                    updated_at: r.get("updated_at"),
                })
            })
            .collect()
    }

    fn message_from_row(row: &sqlx::postgres::PgRow) -> Result<Message> {
        let type_str: String = row.try_get("type").map_err(crate::error::DatabaseError::from)?;
        Ok(Message {
            id: row.try_get("id").map_err(crate::error::DatabaseError::from)?,
            conversation_id: row.try_get("conversation_id").map_err(crate::error::DatabaseError::from)?,
            sender_id: row.try_get::<Option<String>, _>("sender_id").map_err(crate::error::DatabaseError::from)?.unwrap_or_default(),
            content: row.try_get("content").map_err(crate::error::DatabaseError::from)?,
            message_type: type_str.parse()?,
            metadata: row.try_get("metadata").map_err(crate::error::DatabaseError::from)?,
            reply_to_id: row.try_get("reply_to_id").map_err(crate::error::DatabaseError::from)?,
            created_at: row.try_get("created_at").map_err(crate::error::DatabaseError::from)?,
            updated_at: row.try_get("updated_at").map_err(crate::error::DatabaseError::from)?,
            deleted_at: row.try_get("deleted_at").map_err(crate::error::DatabaseError::from)?,
            is_edited: row.try_get("is_edited").map_err(crate::error::DatabaseError::from)?,
        })
    }
}

/// Acquire a transaction-scoped advisory lock keyed by a stable hash of the
/// conversation id. `pg_advisory_xact_lock` releases automatically at
/// commit or rollback -- no unlock call, and no risk of leaking the lock
/// across requests the way a session-scoped lock would.
async fn lock_conversation(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, conversation_id: &str) -> Result<()> {
    let key = conversation_lock_key(conversation_id);
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(key)
        .execute(&mut **tx)
        .await
        .map_err(crate::error::DatabaseError::from)?;
    Ok(())
}

/// Postgres advisory locks take a 64-bit signed key; a 64-bit BLAKE3 prefix
/// gives a stable, well-distributed key from an opaque string id.
fn conversation_lock_key(conversation_id: &str) -> i64 {
    let hash = blake3::hash(conversation_id.as_bytes());
    let bytes: [u8; 8] = hash.as_bytes()[..8].try_into().expect("8 bytes");
    i64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_is_deterministic() {
        assert_eq!(conversation_lock_key("conv-1"), conversation_lock_key("conv-1"));
        assert_ne!(conversation_lock_key("conv-1"), conversation_lock_key("conv-2"));
    }

    #[test]
    fn text_content_length_boundary() {
        let ok = "a".repeat(MAX_TEXT_CONTENT_LEN);
        let too_long = "a".repeat(MAX_TEXT_CONTENT_LEN + 1);
        assert_eq!(ok.chars().count(), MAX_TEXT_CONTENT_LEN);
        assert!(too_long.chars().count() > MAX_TEXT_CONTENT_LEN);
    }
}
