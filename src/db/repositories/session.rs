//! Session repository
//!
//! Database operations for login sessions.
//!
//! Sessions are never deleted. Logging out flips `valid` to false so the
//! row stays available for auditing.
//!
//! A new session is only stored while the user has no other valid session
//! newer than a cutoff. Check and insert are one statement, so concurrent
//! logins cannot both open a session.

use super::parse_uuid;
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist `session` unless the same user already has a valid session
    /// created after `active_since`. Returns whether the row was inserted.
    async fn create_unless_active(
        &self,
        session: &Session,
        active_since: DateTime<Utc>,
    ) -> Result<bool>;

    /// Get session by ID
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Session>>;

    /// Mark one session invalid. Returns rows affected.
    async fn invalidate(&self, id: Uuid) -> Result<u64>;

    /// Mark all of a user's sessions invalid. Returns rows affected.
    async fn invalidate_all_for_user(&self, user_id: Uuid) -> Result<u64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    /// Create a new SQLx session repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create_unless_active(
        &self,
        session: &Session,
        active_since: DateTime<Utc>,
    ) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_session_sqlite(self.pool.sqlite()?, session, active_since).await
            }
            DatabaseDriver::Mysql => {
                create_session_mysql(self.pool.mysql()?, session, active_since).await
            }
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Session>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_session_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_session_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn invalidate(&self, id: Uuid) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => invalidate_session_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => invalidate_session_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn invalidate_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                invalidate_user_sessions_sqlite(self.pool.sqlite()?, user_id).await
            }
            DatabaseDriver::Mysql => {
                invalidate_user_sessions_mysql(self.pool.mysql()?, user_id).await
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_session_sqlite(
    pool: &SqlitePool,
    session: &Session,
    active_since: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO sessions (id, user_id, valid, created_at)
        SELECT ?, ?, ?, ?
        WHERE NOT EXISTS (
            SELECT 1 FROM sessions
            WHERE user_id = ? AND valid = ? AND created_at > ?
        )
        "#,
    )
    .bind(session.id.to_string())
    .bind(session.user_id.to_string())
    .bind(session.valid)
    .bind(session.created_at)
    .bind(session.user_id.to_string())
    .bind(true)
    .bind(active_since)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(result.rows_affected() == 1)
}

async fn get_session_by_id_sqlite(pool: &SqlitePool, id: Uuid) -> Result<Option<Session>> {
    let row = sqlx::query("SELECT id, user_id, valid, created_at FROM sessions WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get session by ID")?;

    row.map(|row| row_to_session_sqlite(&row)).transpose()
}

async fn invalidate_session_sqlite(pool: &SqlitePool, id: Uuid) -> Result<u64> {
    let result = sqlx::query("UPDATE sessions SET valid = ? WHERE id = ?")
        .bind(false)
        .bind(id.to_string())
        .execute(pool)
        .await
        .context("Failed to invalidate session")?;

    Ok(result.rows_affected())
}

async fn invalidate_user_sessions_sqlite(pool: &SqlitePool, user_id: Uuid) -> Result<u64> {
    let result = sqlx::query("UPDATE sessions SET valid = ? WHERE user_id = ?")
        .bind(false)
        .bind(user_id.to_string())
        .execute(pool)
        .await
        .context("Failed to invalidate user sessions")?;

    Ok(result.rows_affected())
}

fn row_to_session_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Session> {
    let id: String = row.get("id");
    let user_id: String = row.get("user_id");

    Ok(Session {
        id: parse_uuid(&id)?,
        user_id: parse_uuid(&user_id)?,
        valid: row.get("valid"),
        created_at: row.get("created_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_session_mysql(
    pool: &MySqlPool,
    session: &Session,
    active_since: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO sessions (id, user_id, valid, created_at)
        SELECT ?, ?, ?, ? FROM DUAL
        WHERE NOT EXISTS (
            SELECT 1 FROM sessions
            WHERE user_id = ? AND valid = TRUE AND created_at > ?
        )
        "#,
    )
    .bind(session.id.to_string())
    .bind(session.user_id.to_string())
    .bind(session.valid)
    .bind(session.created_at)
    .bind(session.user_id.to_string())
    .bind(active_since)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(result.rows_affected() == 1)
}

async fn get_session_by_id_mysql(pool: &MySqlPool, id: Uuid) -> Result<Option<Session>> {
    let row = sqlx::query("SELECT id, user_id, valid, created_at FROM sessions WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get session by ID")?;

    row.map(|row| row_to_session_mysql(&row)).transpose()
}

async fn invalidate_session_mysql(pool: &MySqlPool, id: Uuid) -> Result<u64> {
    let result = sqlx::query("UPDATE sessions SET valid = FALSE WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await
        .context("Failed to invalidate session")?;

    Ok(result.rows_affected())
}

async fn invalidate_user_sessions_mysql(pool: &MySqlPool, user_id: Uuid) -> Result<u64> {
    let result = sqlx::query("UPDATE sessions SET valid = FALSE WHERE user_id = ?")
        .bind(user_id.to_string())
        .execute(pool)
        .await
        .context("Failed to invalidate user sessions")?;

    Ok(result.rows_affected())
}

fn row_to_session_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Session> {
    let id: String = row.get("id");
    let user_id: String = row.get("user_id");

    Ok(Session {
        id: parse_uuid(&id)?,
        user_id: parse_uuid(&user_id)?,
        valid: row.get("valid"),
        created_at: row.get("created_at"),
    })
}
