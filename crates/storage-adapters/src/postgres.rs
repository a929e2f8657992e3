//! # Postgres store
//!
//! Maps the relational model onto the domain entities. Membership sets are
//! stored as arrays on the capsule row so a capsule is always read in one
//! statement.
//!
//! The unlock transition is a single conditional `UPDATE`, so two processes
//! sweeping the same database still produce one winner per capsule.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    Capsule, CapsuleId, CapsuleRepository, Comment, CommentId, CommentRepository, LockState, Memory,
    MemoryId, MemoryKind, MemoryRepository, Reaction, ReactionRepository, RepoError, RepoResult,
    ToggleOutcome, UnlockCondition, UnlockOutcome, UserDirectory, UserId,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

const CAPSULE_COLUMNS: &str = "id, title, theme, unlock_condition, lock_state, owner_id, \
     contributor_ids, recipient_emails, notified_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> RepoResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(db_error)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the bundled migrations.
    pub async fn migrate(&self) -> RepoResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RepoError::Internal(format!("migration failed: {e}")))?;
        info!("database migrations applied");
        Ok(())
    }
}

fn db_error(err: sqlx::Error) -> RepoError {
    match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepoError::Transient(err.to_string())
        }
        sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Conflict(db.message().to_string()),
        _ => RepoError::Internal(err.to_string()),
    }
}

fn lock_state_str(state: LockState) -> &'static str {
    match state {
        LockState::Locked => "locked",
        LockState::Unlocked => "unlocked",
    }
}

fn kind_str(kind: MemoryKind) -> &'static str {
    match kind {
        MemoryKind::Text => "text",
        MemoryKind::Image => "image",
        MemoryKind::Audio => "audio",
        MemoryKind::Video => "video",
    }
}

fn parse_kind(raw: &str) -> RepoResult<MemoryKind> {
    match raw {
        "text" => Ok(MemoryKind::Text),
        "image" => Ok(MemoryKind::Image),
        "audio" => Ok(MemoryKind::Audio),
        "video" => Ok(MemoryKind::Video),
        other => Err(RepoError::Internal(format!("unknown memory kind {other:?}"))),
    }
}

fn capsule_from_row(row: &PgRow) -> RepoResult<Capsule> {
    let lock_state = match row.try_get::<String, _>("lock_state").map_err(db_error)?.as_str() {
        "locked" => LockState::Locked,
        "unlocked" => LockState::Unlocked,
        other => return Err(RepoError::Internal(format!("unknown lock state {other:?}"))),
    };
    let condition: Option<Json<UnlockCondition>> = row.try_get("unlock_condition").map_err(db_error)?;
    let contributors: Vec<Uuid> = row.try_get("contributor_ids").map_err(db_error)?;
    let recipients: Vec<String> = row.try_get("recipient_emails").map_err(db_error)?;

    Ok(Capsule {
        id: row.try_get("id").map_err(db_error)?,
        title: row.try_get("title").map_err(db_error)?,
        theme: row.try_get("theme").map_err(db_error)?,
        unlock_condition: condition.map(|Json(c)| c),
        lock_state,
        owner_id: row.try_get("owner_id").map_err(db_error)?,
        contributor_ids: contributors.into_iter().collect(),
        recipient_emails: recipients.into_iter().collect(),
        notified_at: row.try_get("notified_at").map_err(db_error)?,
        created_at: row.try_get("created_at").map_err(db_error)?,
        updated_at: row.try_get("updated_at").map_err(db_error)?,
    })
}

fn memory_from_row(row: &PgRow) -> RepoResult<Memory> {
    Ok(Memory {
        id: row.try_get("id").map_err(db_error)?,
        capsule_id: row.try_get("capsule_id").map_err(db_error)?,
        kind: parse_kind(row.try_get::<&str, _>("kind").map_err(db_error)?)?,
        content: row.try_get("content").map_err(db_error)?,
        caption: row.try_get("caption").map_err(db_error)?,
        created_by: row.try_get("created_by").map_err(db_error)?,
        created_at: row.try_get("created_at").map_err(db_error)?,
    })
}

fn reaction_from_row(row: &PgRow) -> RepoResult<Reaction> {
    Ok(Reaction {
        id: row.try_get("id").map_err(db_error)?,
        memory_id: row.try_get("memory_id").map_err(db_error)?,
        user_email: row.try_get("user_email").map_err(db_error)?,
        user_name: row.try_get("user_name").map_err(db_error)?,
        emoji: row.try_get("emoji").map_err(db_error)?,
        created_at: row.try_get("created_at").map_err(db_error)?,
    })
}

fn comment_from_row(row: &PgRow) -> RepoResult<Comment> {
    Ok(Comment {
        id: row.try_get("id").map_err(db_error)?,
        memory_id: row.try_get("memory_id").map_err(db_error)?,
        user_email: row.try_get("user_email").map_err(db_error)?,
        user_name: row.try_get("user_name").map_err(db_error)?,
        text: row.try_get("text").map_err(db_error)?,
        created_at: row.try_get("created_at").map_err(db_error)?,
    })
}

fn capsules_from_rows(rows: &[PgRow]) -> RepoResult<Vec<Capsule>> {
    rows.iter().map(capsule_from_row).collect()
}

#[async_trait]
impl CapsuleRepository for PgStore {
    async fn insert(&self, capsule: &Capsule) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO capsules (id, title, theme, unlock_condition, unlock_at, lock_state, owner_id, \
             contributor_ids, recipient_emails, notified_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(capsule.id)
        .bind(&capsule.title)
        .bind(&capsule.theme)
        .bind(capsule.unlock_condition.as_ref().map(Json))
        .bind(capsule.unlock_at())
        .bind(lock_state_str(capsule.lock_state))
        .bind(capsule.owner_id)
        .bind(capsule.contributor_ids.iter().copied().collect::<Vec<Uuid>>())
        .bind(capsule.recipient_emails.iter().cloned().collect::<Vec<String>>())
        .bind(capsule.notified_at)
        .bind(capsule.created_at)
        .bind(capsule.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get(&self, id: CapsuleId) -> RepoResult<Capsule> {
        let row = sqlx::query(&format!("SELECT {CAPSULE_COLUMNS} FROM capsules WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| RepoError::NotFound("capsule", id.to_string()))?;
        capsule_from_row(&row)
    }

    async fn update_metadata(&self, capsule: &Capsule) -> RepoResult<()> {
        let result = sqlx::query(
            "UPDATE capsules SET title = $2, theme = $3, unlock_condition = $4, unlock_at = $5, \
             contributor_ids = $6, recipient_emails = $7, updated_at = $8 WHERE id = $1",
        )
        .bind(capsule.id)
        .bind(&capsule.title)
        .bind(&capsule.theme)
        .bind(capsule.unlock_condition.as_ref().map(Json))
        .bind(capsule.unlock_at())
        .bind(capsule.contributor_ids.iter().copied().collect::<Vec<Uuid>>())
        .bind(capsule.recipient_emails.iter().cloned().collect::<Vec<String>>())
        .bind(capsule.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound("capsule", capsule.id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, id: CapsuleId) -> RepoResult<()> {
        let result = sqlx::query("DELETE FROM capsules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound("capsule", id.to_string()));
        }
        Ok(())
    }

    async fn find_by_owner_or_contributor(&self, user: UserId) -> RepoResult<Vec<Capsule>> {
        let rows = sqlx::query(&format!(
            "SELECT {CAPSULE_COLUMNS} FROM capsules \
             WHERE owner_id = $1 OR $1 = ANY(contributor_ids) \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(user)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        capsules_from_rows(&rows)
    }

    async fn find_by_recipient_email(&self, email: &str) -> RepoResult<Vec<Capsule>> {
        let rows = sqlx::query(&format!(
            "SELECT {CAPSULE_COLUMNS} FROM capsules \
             WHERE $1 = ANY(recipient_emails) \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        capsules_from_rows(&rows)
    }

    async fn find_locked_past_due(&self, now: DateTime<Utc>) -> RepoResult<Vec<Capsule>> {
        let rows = sqlx::query(&format!(
            "SELECT {CAPSULE_COLUMNS} FROM capsules \
             WHERE lock_state = 'locked' AND unlock_at IS NOT NULL AND unlock_at <= $1 \
             ORDER BY unlock_at, id"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        capsules_from_rows(&rows)
    }

    async fn try_unlock(&self, id: CapsuleId, now: DateTime<Utc>) -> RepoResult<UnlockOutcome> {
        // `prior` sees the row before the update, so it still carries the old notified_at
        let row = sqlx::query(
            "WITH prior AS (SELECT id, notified_at FROM capsules WHERE id = $1 FOR UPDATE) \
             UPDATE capsules c SET lock_state = 'unlocked', notified_at = COALESCE(c.notified_at, $2) \
             FROM prior WHERE c.id = prior.id AND c.lock_state = 'locked' \
             RETURNING prior.notified_at IS NOT NULL AS notified_before",
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        if let Some(row) = row {
            let notified_before: bool = row.try_get("notified_before").map_err(db_error)?;
            debug!(capsule_id = %id, notified_before, "capsule row unlocked");
            return Ok(UnlockOutcome::Transitioned { notified_before });
        }

        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM capsules WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        if exists {
            Ok(UnlockOutcome::AlreadyUnlocked)
        } else {
            Err(RepoError::NotFound("capsule", id.to_string()))
        }
    }
}

#[async_trait]
impl MemoryRepository for PgStore {
    async fn insert(&self, memory: &Memory) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO memories (id, capsule_id, kind, content, caption, created_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(memory.id)
        .bind(memory.capsule_id)
        .bind(kind_str(memory.kind))
        .bind(&memory.content)
        .bind(&memory.caption)
        .bind(memory.created_by)
        .bind(memory.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get(&self, id: MemoryId) -> RepoResult<Memory> {
        let row = sqlx::query("SELECT * FROM memories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| RepoError::NotFound("memory", id.to_string()))?;
        memory_from_row(&row)
    }

    async fn list_by_capsule(&self, capsule: CapsuleId) -> RepoResult<Vec<Memory>> {
        sqlx::query("SELECT * FROM memories WHERE capsule_id = $1 ORDER BY created_at, id")
            .bind(capsule)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?
            .iter()
            .map(memory_from_row)
            .collect()
    }

    async fn delete(&self, id: MemoryId) -> RepoResult<()> {
        let result = sqlx::query("DELETE FROM memories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound("memory", id.to_string()));
        }
        Ok(())
    }

    async fn delete_by_capsule(&self, capsule: CapsuleId) -> RepoResult<u64> {
        let result = sqlx::query("DELETE FROM memories WHERE capsule_id = $1")
            .bind(capsule)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ReactionRepository for PgStore {
    async fn toggle(&self, reaction: Reaction) -> RepoResult<ToggleOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let removed = sqlx::query(
            "DELETE FROM reactions WHERE memory_id = $1 AND user_email = $2 AND emoji = $3 RETURNING *",
        )
        .bind(reaction.memory_id)
        .bind(&reaction.user_email)
        .bind(&reaction.emoji)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?;

        let outcome = match removed {
            Some(row) => ToggleOutcome::Removed(reaction_from_row(&row)?),
            None => {
                let inserted = sqlx::query(
                    "INSERT INTO reactions (id, memory_id, user_email, user_name, emoji, created_at) \
                     VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (memory_id, user_email, emoji) DO NOTHING",
                )
                .bind(reaction.id)
                .bind(reaction.memory_id)
                .bind(&reaction.user_email)
                .bind(&reaction.user_name)
                .bind(&reaction.emoji)
                .bind(reaction.created_at)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
                if inserted.rows_affected() == 0 {
                    return Err(RepoError::Conflict("concurrent reaction toggle".into()));
                }
                ToggleOutcome::Added(reaction)
            }
        };

        tx.commit().await.map_err(db_error)?;
        Ok(outcome)
    }

    async fn list_by_memory(&self, memory: MemoryId) -> RepoResult<Vec<Reaction>> {
        sqlx::query("SELECT * FROM reactions WHERE memory_id = $1 ORDER BY created_at, id")
            .bind(memory)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?
            .iter()
            .map(reaction_from_row)
            .collect()
    }

    async fn delete_by_memory(&self, memory: MemoryId) -> RepoResult<u64> {
        let result = sqlx::query("DELETE FROM reactions WHERE memory_id = $1")
            .bind(memory)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CommentRepository for PgStore {
    async fn insert(&self, comment: &Comment) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO comments (id, memory_id, user_email, user_name, text, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(comment.id)
        .bind(comment.memory_id)
        .bind(&comment.user_email)
        .bind(&comment.user_name)
        .bind(&comment.text)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get(&self, id: CommentId) -> RepoResult<Comment> {
        let row = sqlx::query("SELECT * FROM comments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or_else(|| RepoError::NotFound("comment", id.to_string()))?;
        comment_from_row(&row)
    }

    async fn list_by_memory(&self, memory: MemoryId) -> RepoResult<Vec<Comment>> {
        sqlx::query("SELECT * FROM comments WHERE memory_id = $1 ORDER BY created_at, id")
            .bind(memory)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?
            .iter()
            .map(comment_from_row)
            .collect()
    }

    async fn delete(&self, id: CommentId) -> RepoResult<()> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound("comment", id.to_string()));
        }
        Ok(())
    }

    async fn delete_by_memory(&self, memory: MemoryId) -> RepoResult<u64> {
        let result = sqlx::query("DELETE FROM comments WHERE memory_id = $1")
            .bind(memory)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn email_of(&self, user: UserId) -> RepoResult<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE id = $1")
            .bind(user)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)
    }
}
