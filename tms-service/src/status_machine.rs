//! Per-(message, recipient) delivery/read status: SENT -> DELIVERED -> READ,
//! monotonic, with regressions silently dropped.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::error::Result;

pub struct StatusMachine {
    pool: PgPool,
}

/// Result of a bulk status transition: how many rows actually moved.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkUpdateOutcome {
    pub count: u64,
}

impl StatusMachine {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Mark messages delivered for `user_id` in `conversation_id`. An empty
    /// or absent `message_ids` means "all currently SENT messages in this
    /// conversation for this user". Always a single multi-row statement
    /// conditioned on `status = 'SENT'` so a regression from DELIVERED or
    /// READ can never happen, and the caller emits exactly one
    /// `messages_delivered` event carrying the affected count.
    pub async fn mark_delivered(
        &self,
        conversation_id: &str,
        user_id: &str,
        message_ids: Option<&[String]>,
    ) -> Result<BulkUpdateOutcome> {
        let now = Utc::now();

        let result = match message_ids.filter(|ids| !ids.is_empty()) {
            Some(ids) => {
                sqlx::query(
                    "UPDATE message_statuses ms SET status = 'DELIVERED', updated_at = $1 \
                     FROM messages m \
                     WHERE ms.message_id = m.id AND m.conversation_id = $2 \
                       AND ms.recipient_id = $3 AND ms.status = 'SENT' \
                       AND ms.message_id = ANY($4)",
                )
                .bind(now)
                .bind(conversation_id)
                .bind(user_id)
                .bind(ids)
                .execute(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "UPDATE message_statuses ms SET status = 'DELIVERED', updated_at = $1 \
                     FROM messages m \
                     WHERE ms.message_id = m.id AND m.conversation_id = $2 \
                       AND ms.recipient_id = $3 AND ms.status = 'SENT'",
                )
                .bind(now)
                .bind(conversation_id)
                .bind(user_id)
                .execute(&self.pool)
                .await
            }
        }
        .map_err(crate::error::DatabaseError::from)?;

        Ok(BulkUpdateOutcome { count: result.rows_affected() })
    }

    /// Mark specific messages read for `user_id`, advancing
    /// `conversation_members.last_read_at` to the max `created_at` among
    /// the affected messages. Idempotent: re-marking an already-READ
    /// message is a no-op, not an error.
    pub async fn mark_read(
        &self,
        conversation_id: &str,
        user_id: &str,
        message_ids: &[String],
    ) -> Result<BulkUpdateOutcome> {
        if message_ids.is_empty() {
            return Ok(BulkUpdateOutcome::default());
        }

        let mut tx = self.pool.begin().await.map_err(crate::error::DatabaseError::from)?;
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE message_statuses ms SET status = 'READ', updated_at = $1 \
             FROM messages m \
             WHERE ms.message_id = m.id AND m.conversation_id = $2 \
               AND ms.recipient_id = $3 AND ms.status IN ('SENT', 'DELIVERED') \
               AND ms.message_id = ANY($4)",
        )
        .bind(now)
        .bind(conversation_id)
        .bind(user_id)
        .bind(message_ids)
        .execute(&mut *tx)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        let max_created_at: Option<DateTime<Utc>> = sqlx::query(
            "SELECT MAX(created_at) AS max_created_at FROM messages WHERE id = ANY($1) AND conversation_id = $2",
        )
        .bind(message_ids)
        .bind(conversation_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(crate::error::DatabaseError::from)?
        .try_get("max_created_at")
        .map_err(crate::error::DatabaseError::from)?;

        if let Some(max_created_at) = max_created_at {
            sqlx::query(
                "UPDATE conversation_members SET last_read_at = GREATEST(COALESCE(last_read_at, 'epoch'), $1) \
                 WHERE conversation_id = $2 AND user_id = $3",
            )
            .bind(max_created_at)
            .bind(conversation_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(crate::error::DatabaseError::from)?;
        }

        tx.commit().await.map_err(crate::error::DatabaseError::from)?;

        Ok(BulkUpdateOutcome { count: result.rows_affected() })
    }

    /// Unread count, computed on demand rather than materialized: messages
    /// in the conversation created after `last_read_at` and not sent by
    /// `user_id` themselves.
    pub async fn unread_count(&self, conversation_id: &str, user_id: &str) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM messages m \
             WHERE m.conversation_id = $1 AND m.sender_id != $2 AND m.deleted_at IS NULL \
               AND m.created_at > COALESCE( \
                 (SELECT last_read_at FROM conversation_members WHERE conversation_id = $1 AND user_id = $2), \
                 'epoch'::timestamptz \
               )",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        Ok(row.get("n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_outcome_defaults_to_zero() {
        assert_eq!(BulkUpdateOutcome::default().count, 0);
    }
}
