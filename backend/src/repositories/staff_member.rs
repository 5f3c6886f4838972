use sqlx::PgPool;

use crate::models::staff_member::StaffMember;
use crate::types::{GuildId, UserId};

const STAFF_COLUMNS: &str =
    "user_id, guild_id, username, required_minutes, is_active, created_at, updated_at";

pub async fn upsert_staff_member(
    pool: &PgPool,
    member: &StaffMember,
) -> Result<StaffMember, sqlx::Error> {
    let query = format!(
        r#"
        INSERT INTO staff_members
            (user_id, guild_id, username, required_minutes, is_active, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (user_id, guild_id) DO UPDATE
        SET username = EXCLUDED.username,
            required_minutes = EXCLUDED.required_minutes,
            is_active = EXCLUDED.is_active,
            updated_at = EXCLUDED.updated_at
        RETURNING {}
        "#,
        STAFF_COLUMNS
    );
    sqlx::query_as::<_, StaffMember>(&query)
        .bind(&member.user_id)
        .bind(&member.guild_id)
        .bind(&member.username)
        .bind(member.required_minutes)
        .bind(member.is_active)
        .bind(member.created_at)
        .bind(member.updated_at)
        .fetch_one(pool)
        .await
}

pub async fn find_staff_member(
    pool: &PgPool,
    user_id: &UserId,
    guild_id: &GuildId,
) -> Result<Option<StaffMember>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM staff_members WHERE user_id = $1 AND guild_id = $2",
        STAFF_COLUMNS
    );
    sqlx::query_as::<_, StaffMember>(&query)
        .bind(user_id)
        .bind(guild_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_active_staff(
    pool: &PgPool,
    guild_id: &GuildId,
) -> Result<Vec<StaffMember>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM staff_members WHERE guild_id = $1 AND is_active = TRUE ORDER BY username",
        STAFF_COLUMNS
    );
    sqlx::query_as::<_, StaffMember>(&query)
        .bind(guild_id)
        .fetch_all(pool)
        .await
}
