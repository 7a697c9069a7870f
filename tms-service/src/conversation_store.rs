//! Conversation lifecycle: DM canonicalization, group membership/admin
//! rules, and search.

use chrono::Utc;
use sqlx::{PgPool, Row};

use crate::error::{Error, Result};
use crate::models::{
    Conversation, ConversationMember, ConversationRole, ConversationType, MAX_GROUP_MEMBERS,
    MIN_GROUP_MEMBERS,
};

/// Owns conversation and membership persistence.
#[derive(Clone)]
pub struct ConversationStore {
    pool: PgPool,
}

impl ConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create (or return the existing) DM between two users.
    ///
    /// DMs are canonicalized on the sorted member pair: a unique partial
    /// index on `(least(a,b), greatest(a,b))` for `type = 'DM'` rejects a
    /// concurrent second insert, so a racing pair of `create_dm` calls
    /// converges on exactly one row rather than two.
    pub async fn create_dm(&self, user_a: &str, user_b: &str) -> Result<Conversation> {
        if user_a == user_b {
            return Err(Error::ValidationError("cannot create a DM with oneself".into()));
        }

        let mut tx = self.pool.begin().await.map_err(crate::error::DatabaseError::from)?;
        let id = new_id();
        let now = Utc::now();

        let inserted = sqlx::query(
            "INSERT INTO conversations (id, type, name, avatar_url, created_by, created_at, updated_at) \
             VALUES ($1, 'DM', NULL, NULL, $2, $3, $3) \
             ON CONFLICT DO NOTHING",
        )
        .bind(&id)
        .bind(user_a)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        if inserted.rows_affected() == 0 {
            // Someone beat us to it; find the existing pair.
            tx.rollback().await.map_err(crate::error::DatabaseError::from)?;
            return self
                .find_dm(user_a, user_b)
                .await?
                .ok_or_else(|| Error::Conflict("DM pair exists but could not be located".into()));
        }

        for member in [user_a, user_b] {
            sqlx::query(
                "INSERT INTO conversation_members (conversation_id, user_id, role, joined_at) \
                 VALUES ($1, $2, 'MEMBER', $3)",
            )
            .bind(&id)
            .bind(member)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(crate::error::DatabaseError::from)?;
        }

        tx.commit().await.map_err(crate::error::DatabaseError::from)?;

        Ok(Conversation {
            id,
            conversation_type: ConversationType::Dm,
            name: None,
            avatar_url: None,
            created_by: user_a.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn find_dm(&self, user_a: &str, user_b: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query(
            "SELECT c.id, c.type, c.name, c.avatar_url, c.created_by, c.created_at, c.updated_at \
             FROM conversations c \
             WHERE c.type = 'DM' \
               AND EXISTS (SELECT 1 FROM conversation_members m WHERE m.conversation_id = c.id AND m.user_id = $1) \
               AND EXISTS (SELECT 1 FROM conversation_members m WHERE m.conversation_id = c.id AND m.user_id = $2)",
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        row.map(|r| Self::conversation_from_row(&r)).transpose()
    }

    /// Create a group conversation. The creator becomes its sole ADMIN;
    /// member counts must satisfy `2..=256` including the creator.
    pub async fn create_group(
        &self,
        created_by: &str,
        name: &str,
        member_ids: &[String],
    ) -> Result<Conversation> {
        let mut members: Vec<&str> = member_ids.iter().map(String::as_str).collect();
        if !members.contains(&created_by) {
            members.push(created_by);
        }
        members.sort_unstable();
        members.dedup();

        if members.len() < MIN_GROUP_MEMBERS {
            return Err(Error::ValidationError(format!(
                "group conversations require at least {MIN_GROUP_MEMBERS} members"
            )));
        }
        if members.len() > MAX_GROUP_MEMBERS {
            return Err(Error::ValidationError(format!(
                "group conversations allow at most {MAX_GROUP_MEMBERS} members"
            )));
        }

        let mut tx = self.pool.begin().await.map_err(crate::error::DatabaseError::from)?;
        let id = new_id();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO conversations (id, type, name, avatar_url, created_by, created_at, updated_at) \
             VALUES ($1, 'GROUP', $2, NULL, $3, $4, $4)",
        )
        .bind(&id)
        .bind(name)
        .bind(created_by)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        for member in &members {
            let role = if *member == created_by { "ADMIN" } else { "MEMBER" };
            sqlx::query(
                "INSERT INTO conversation_members (conversation_id, user_id, role, joined_at) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(&id)
            .bind(member)
            .bind(role)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(crate::error::DatabaseError::from)?;
        }

        tx.commit().await.map_err(crate::error::DatabaseError::from)?;

        Ok(Conversation {
            id,
            conversation_type: ConversationType::Group,
            name: Some(name.to_string()),
            avatar_url: None,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether `user_id` is currently a member of `conversation_id`. Required
    /// before any read/send/edit operation touches the conversation.
    pub async fn is_member(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM conversation_members WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        Ok(row.is_some())
    }

    /// Whether `user_id` holds the ADMIN role in `conversation_id`.
    pub async fn is_admin(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT role FROM conversation_members WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        Ok(row.map(|r| r.get::<String, _>("role") == "ADMIN").unwrap_or(false))
    }

    /// Add a member to a group. Requires the actor to be an ADMIN.
    pub async fn add_member(&self, conversation_id: &str, actor: &str, new_member: &str) -> Result<()> {
        self.require_group_admin(conversation_id, actor).await?;

        let current_count: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM conversation_members WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?
        .get("n");

        if current_count as usize >= MAX_GROUP_MEMBERS {
            return Err(Error::ValidationError(format!(
                "group conversations allow at most {MAX_GROUP_MEMBERS} members"
            )));
        }

        sqlx::query(
            "INSERT INTO conversation_members (conversation_id, user_id, role, joined_at) \
             VALUES ($1, $2, 'MEMBER', $3) ON CONFLICT DO NOTHING",
        )
        .bind(conversation_id)
        .bind(new_member)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        Ok(())
    }

    /// Remove a member. Requires the actor to be an ADMIN, or the target to
    /// be leaving voluntarily (`actor == target`, always allowed).
    pub async fn remove_member(&self, conversation_id: &str, actor: &str, target: &str) -> Result<()> {
        if actor != target {
            self.require_group_admin(conversation_id, actor).await?;
        }

        sqlx::query("DELETE FROM conversation_members WHERE conversation_id = $1 AND user_id = $2")
            .bind(conversation_id)
            .bind(target)
            .execute(&self.pool)
            .await
            .map_err(crate::error::DatabaseError::from)?;

        // Admin-less groups are an explicit design choice (see DESIGN.md);
        // we don't auto-promote a replacement admin when the last one leaves.
        Ok(())
    }

    /// Rename a group. Requires the actor to be an ADMIN.
    pub async fn rename(&self, conversation_id: &str, actor: &str, new_name: &str) -> Result<()> {
        self.require_group_admin(conversation_id, actor).await?;

        sqlx::query("UPDATE conversations SET name = $1, updated_at = $2 WHERE id = $3")
            .bind(new_name)
            .bind(Utc::now())
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(crate::error::DatabaseError::from)?;

        Ok(())
    }

    async fn require_group_admin(&self, conversation_id: &str, actor: &str) -> Result<()> {
        if !self.is_admin(conversation_id, actor).await? {
            return Err(Error::Forbidden("admin privileges required".into()));
        }
        Ok(())
    }

    /// List all conversations `user_id` belongs to, most recently active first.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            "SELECT c.id, c.type, c.name, c.avatar_url, c.created_by, c.created_at, c.updated_at \
             FROM conversations c \
             JOIN conversation_members m ON m.conversation_id = c.id \
             WHERE m.user_id = $1 \
             ORDER BY c.updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        rows.iter().map(Self::conversation_from_row).collect()
    }

    /// Search conversations visible to `user_id` by name or other members'
    /// display names. Ranked by trigram similarity: name match weighted
    /// 0.6, other-member-name match weighted 0.4, with any exact substring
    /// hit overriding to a rank of 1.0. Requires trigram GIN indexes on
    /// `conversations(lower(name))` and `users(lower(display_name))`.
    pub async fn search(&self, user_id: &str, query: &str) -> Result<Vec<Conversation>> {
        let pattern = format!("%{}%", query.to_lowercase());

        let rows = sqlx::query(
            "SELECT c.id, c.type, c.name, c.avatar_url, c.created_by, c.created_at, c.updated_at, \
               GREATEST( \
                 CASE WHEN lower(c.name) LIKE $3 THEN 1.0 ELSE similarity(lower(coalesce(c.name, '')), lower($2)) * 0.6 END, \
                 COALESCE(( \
                   SELECT MAX( \
                     CASE WHEN lower(u.display_name) LIKE $3 THEN 1.0 \
                          ELSE similarity(lower(u.display_name), lower($2)) * 0.4 END) \
                   FROM conversation_members om \
                   JOIN users u ON u.tms_user_id = om.user_id \
                   WHERE om.conversation_id = c.id AND om.user_id != $1 \
                 ), 0.0) \
               ) AS rank \
             FROM conversations c \
             JOIN conversation_members m ON m.conversation_id = c.id \
             WHERE m.user_id = $1 \
             HAVING GREATEST( \
                 CASE WHEN lower(c.name) LIKE $3 THEN 1.0 ELSE similarity(lower(coalesce(c.name, '')), lower($2)) * 0.6 END, \
                 COALESCE(( \
                   SELECT MAX( \
                     CASE WHEN lower(u.display_name) LIKE $3 THEN 1.0 \
                          ELSE similarity(lower(u.display_name), lower($2)) * 0.4 END) \
                   FROM conversation_members om \
                   JOIN users u ON u.tms_user_id = om.user_id \
                   WHERE om.conversation_id = c.id AND om.user_id != $1 \
                 ), 0.0) \
             ) >= 0.3 \
             GROUP BY c.id \
             ORDER BY rank DESC \
             LIMIT 50",
        )
        .bind(user_id)
        .bind(query)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        rows.iter().map(Self::conversation_from_row).collect()
    }

    pub async fn get(&self, conversation_id: &str) -> Result<Conversation> {
        let row = sqlx::query(
            "SELECT id, type, name, avatar_url, created_by, created_at, updated_at \
             FROM conversations WHERE id = $1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?
        .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id} not found")))?;

        Self::conversation_from_row(&row)
    }

    pub async fn touch(&self, conversation_id: &str) -> Result<()> {
        sqlx::query("UPDATE conversations SET updated_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(crate::error::DatabaseError::from)?;
        Ok(())
    }

    pub async fn member(&self, conversation_id: &str, user_id: &str) -> Result<Option<ConversationMember>> {
        let row = sqlx::query(
            "SELECT conversation_id, user_id, role, joined_at, last_read_at, is_muted, mute_until \
             FROM conversation_members WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        row.map(|r| Self::member_from_row(&r)).transpose()
    }

    /// All member user IDs other than `exclude`.
    pub async fn other_member_ids(&self, conversation_id: &str, exclude: &str) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT user_id FROM conversation_members WHERE conversation_id = $1 AND user_id != $2",
        )
        .bind(conversation_id)
        .bind(exclude)
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DatabaseError::from)?;

        Ok(rows.iter().map(|r| r.get("user_id")).collect())
    }

    fn conversation_from_row(row: &sqlx::postgres::PgRow) -> Result<Conversation> {
        let type_str: String = row.try_get("type").map_err(crate::error::DatabaseError::from)?;
        Ok(Conversation {
            id: row.try_get("id").map_err(crate::error::DatabaseError::from)?,
            conversation_type: type_str.parse()?,
            name: row.try_get("name").map_err(crate::error::DatabaseError::from)?,
            avatar_url: row.try_get("avatar_url").map_err(crate::error::DatabaseError::from)?,
            created_by: row.try_get("created_by").map_err(crate::error::DatabaseError::from)?,
            created_at: row.try_get("created_at").map_err(crate::error::DatabaseError::from)?,
            updated_at: row.try_get("updated_at").map_err(crate::error::DatabaseError::from)?,
        })
    }

    fn member_from_row(row: &sqlx::postgres::PgRow) -> Result<ConversationMember> {
        let role_str: String = row.try_get("role").map_err(crate::error::DatabaseError::from)?;
        Ok(ConversationMember {
            conversation_id: row.try_get("conversation_id").map_err(crate::error::DatabaseError::from)?,
            user_id: row.try_get("user_id").map_err(crate::error::DatabaseError::from)?,
            role: role_str.parse()?,
            joined_at: row.try_get("joined_at").map_err(crate::error::DatabaseError::from)?,
            last_read_at: row.try_get("last_read_at").map_err(crate::error::DatabaseError::from)?,
            is_muted: row.try_get("is_muted").map_err(crate::error::DatabaseError::from)?,
            mute_until: row.try_get("mute_until").map_err(crate::error::DatabaseError::from)?,
        })
    }
}

/// Minting convention for locally created entity IDs: 36-char UUIDs, which
/// sit alongside upstream-issued CUIDs in the same `VARCHAR(255)` columns.
fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_id_is_uuid_shaped() {
        let id = new_id();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn group_member_bounds_are_enforced_before_any_query() {
        // Below MIN_GROUP_MEMBERS once deduped (creator == only member).
        let members: Vec<String> = vec![];
        let mut all: Vec<&str> = members.iter().map(String::as_str).collect();
        all.push("creator");
        all.sort_unstable();
        all.dedup();
        assert!(all.len() < MIN_GROUP_MEMBERS);
    }
}
