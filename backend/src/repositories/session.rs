use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::models::session::Session;
use crate::types::{GuildId, SessionId, UserId};

const SESSION_COLUMNS: &str = "id, user_id, username, guild_id, channel_id, channel_name, \
     join_time, leave_time, duration_minutes, is_afk, date, is_active, created_at, updated_at";

pub async fn insert_session(pool: &PgPool, session: &Session) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sessions
            (id, user_id, username, guild_id, channel_id, channel_name,
             join_time, leave_time, duration_minutes, is_afk, date, is_active,
             created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(session.id)
    .bind(&session.user_id)
    .bind(&session.username)
    .bind(&session.guild_id)
    .bind(&session.channel_id)
    .bind(&session.channel_name)
    .bind(session.join_time)
    .bind(session.leave_time)
    .bind(session.duration_minutes)
    .bind(session.is_afk)
    .bind(session.date)
    .bind(session.is_active)
    .bind(session.created_at)
    .bind(session.updated_at)
    .execute(pool)
    .await
    .map(|_| ())
}

pub async fn find_session_by_id(
    pool: &PgPool,
    id: SessionId,
) -> Result<Option<Session>, sqlx::Error> {
    let query = format!("SELECT {} FROM sessions WHERE id = $1", SESSION_COLUMNS);
    sqlx::query_as::<_, Session>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_active_session(
    pool: &PgPool,
    user_id: &UserId,
    guild_id: &GuildId,
) -> Result<Option<Session>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM sessions WHERE user_id = $1 AND guild_id = $2 AND is_active = TRUE \
         ORDER BY join_time DESC LIMIT 1",
        SESSION_COLUMNS
    );
    sqlx::query_as::<_, Session>(&query)
        .bind(user_id)
        .bind(guild_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_active_sessions(pool: &PgPool) -> Result<Vec<Session>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM sessions WHERE is_active = TRUE ORDER BY join_time",
        SESSION_COLUMNS
    );
    sqlx::query_as::<_, Session>(&query).fetch_all(pool).await
}

pub async fn list_active_sessions_by_guild(
    pool: &PgPool,
    guild_id: &GuildId,
) -> Result<Vec<Session>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM sessions WHERE guild_id = $1 AND is_active = TRUE ORDER BY join_time",
        SESSION_COLUMNS
    );
    sqlx::query_as::<_, Session>(&query)
        .bind(guild_id)
        .fetch_all(pool)
        .await
}

pub async fn list_sessions_for_user_on_date(
    pool: &PgPool,
    user_id: &UserId,
    guild_id: &GuildId,
    date: NaiveDate,
) -> Result<Vec<Session>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM sessions WHERE user_id = $1 AND guild_id = $2 AND date = $3 \
         ORDER BY join_time",
        SESSION_COLUMNS
    );
    sqlx::query_as::<_, Session>(&query)
        .bind(user_id)
        .bind(guild_id)
        .bind(date)
        .fetch_all(pool)
        .await
}

/// Closes a session if and only if it is still active.
///
/// Returns whether a row was closed. The `is_active = TRUE` guard is the
/// tie-break between a live leave event and a concurrent midnight split:
/// the first closer wins, the loser sees `false` and skips its follow-up.
pub async fn close_session(
    pool: &PgPool,
    id: SessionId,
    leave_time: DateTime<Utc>,
    duration_minutes: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE sessions
        SET leave_time = $1,
            duration_minutes = $2,
            is_active = FALSE,
            updated_at = $1
        WHERE id = $3
          AND is_active = TRUE
        "#,
    )
    .bind(leave_time)
    .bind(duration_minutes)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Per-user productive minute totals for a guild-local date, open sessions
/// counted at their live elapsed time. Feeds the leaderboard endpoint.
pub async fn sum_minutes_by_guild_and_date(
    pool: &PgPool,
    guild_id: &GuildId,
    date: NaiveDate,
) -> Result<Vec<(UserId, String, i64)>, sqlx::Error> {
    let rows: Vec<(UserId, String, i64)> = sqlx::query_as(
        r#"
        SELECT user_id,
               MAX(username) AS username,
               SUM(
                   CASE
                       WHEN is_active THEN
                           GREATEST(0, FLOOR(EXTRACT(EPOCH FROM (NOW() - join_time)) / 60))::BIGINT
                       ELSE duration_minutes
                   END
               )::BIGINT AS total_minutes
        FROM sessions
        WHERE guild_id = $1
          AND date = $2
          AND is_afk = FALSE
        GROUP BY user_id
        ORDER BY total_minutes DESC
        "#,
    )
    .bind(guild_id)
    .bind(date)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
