use chrono::NaiveDate;
use sqlx::{PgPool, Row};

use crate::models::adjustment::Adjustment;
use crate::types::{GuildId, UserId};

const ADJUSTMENT_COLUMNS: &str =
    "id, user_id, username, guild_id, date, minutes, kind, reason, adjusted_by, created_at";

pub async fn insert_adjustment(
    pool: &PgPool,
    adjustment: &Adjustment,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO adjustments
            (id, user_id, username, guild_id, date, minutes, kind, reason, adjusted_by, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(adjustment.id)
    .bind(&adjustment.user_id)
    .bind(&adjustment.username)
    .bind(&adjustment.guild_id)
    .bind(adjustment.date)
    .bind(adjustment.minutes)
    .bind(&adjustment.kind)
    .bind(&adjustment.reason)
    .bind(&adjustment.adjusted_by)
    .bind(adjustment.created_at)
    .execute(pool)
    .await
    .map(|_| ())
}

pub async fn list_adjustments_for_user_on_date(
    pool: &PgPool,
    user_id: &UserId,
    guild_id: &GuildId,
    date: NaiveDate,
) -> Result<Vec<Adjustment>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM adjustments WHERE user_id = $1 AND guild_id = $2 AND date = $3 \
         ORDER BY created_at",
        ADJUSTMENT_COLUMNS
    );
    sqlx::query_as::<_, Adjustment>(&query)
        .bind(user_id)
        .bind(guild_id)
        .bind(date)
        .fetch_all(pool)
        .await
}

/// Net signed adjustment minutes for a user on a guild-local date.
pub async fn sum_adjustment_minutes(
    pool: &PgPool,
    user_id: &UserId,
    guild_id: &GuildId,
    date: NaiveDate,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(SUM(CASE WHEN kind = 'add' THEN minutes ELSE -minutes END), 0)::BIGINT
               AS net_minutes
        FROM adjustments
        WHERE user_id = $1
          AND guild_id = $2
          AND date = $3
        "#,
    )
    .bind(user_id)
    .bind(guild_id)
    .bind(date)
    .fetch_one(pool)
    .await?;
    row.try_get("net_minutes")
}
