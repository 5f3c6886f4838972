//! The session store seam the tracker writes through.
//!
//! The database is the source of truth for session records; the tracker's
//! in-memory index is only a dispatch cache. Putting the store behind a
//! trait lets the tracker be exercised against an in-memory implementation
//! and mockall mocks without a running Postgres.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::error::StoreError;
use crate::models::session::Session;
use crate::repositories::session;
use crate::types::{GuildId, SessionId, UserId};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &Session) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: SessionId) -> Result<Option<Session>, StoreError>;

    async fn find_active_for_user(
        &self,
        user_id: &UserId,
        guild_id: &GuildId,
    ) -> Result<Option<Session>, StoreError>;

    async fn list_active(&self) -> Result<Vec<Session>, StoreError>;

    async fn list_active_by_guild(&self, guild_id: &GuildId) -> Result<Vec<Session>, StoreError>;

    async fn list_for_user_on_date(
        &self,
        user_id: &UserId,
        guild_id: &GuildId,
        date: NaiveDate,
    ) -> Result<Vec<Session>, StoreError>;

    /// Closes the session only if it is still active; returns whether a row
    /// was closed. See `repositories::session::close_session` for the race
    /// tie-break this guard provides.
    async fn close(
        &self,
        id: SessionId,
        leave_time: DateTime<Utc>,
        duration_minutes: i64,
    ) -> Result<bool, StoreError>;
}

/// Postgres-backed store delegating to the sqlx repository functions.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        session::insert_session(&self.pool, session)
            .await
            .map_err(StoreError::from)
    }

    async fn find_by_id(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        session::find_session_by_id(&self.pool, id)
            .await
            .map_err(StoreError::from)
    }

    async fn find_active_for_user(
        &self,
        user_id: &UserId,
        guild_id: &GuildId,
    ) -> Result<Option<Session>, StoreError> {
        session::find_active_session(&self.pool, user_id, guild_id)
            .await
            .map_err(StoreError::from)
    }

    async fn list_active(&self) -> Result<Vec<Session>, StoreError> {
        session::list_active_sessions(&self.pool)
            .await
            .map_err(StoreError::from)
    }

    async fn list_active_by_guild(&self, guild_id: &GuildId) -> Result<Vec<Session>, StoreError> {
        session::list_active_sessions_by_guild(&self.pool, guild_id)
            .await
            .map_err(StoreError::from)
    }

    async fn list_for_user_on_date(
        &self,
        user_id: &UserId,
        guild_id: &GuildId,
        date: NaiveDate,
    ) -> Result<Vec<Session>, StoreError> {
        session::list_sessions_for_user_on_date(&self.pool, user_id, guild_id, date)
            .await
            .map_err(StoreError::from)
    }

    async fn close(
        &self,
        id: SessionId,
        leave_time: DateTime<Utc>,
        duration_minutes: i64,
    ) -> Result<bool, StoreError> {
        session::close_session(&self.pool, id, leave_time, duration_minutes)
            .await
            .map_err(StoreError::from)
    }
}
