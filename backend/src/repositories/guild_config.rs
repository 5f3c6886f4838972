use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use sqlx::PgPool;

use crate::models::guild_config::GuildConfig;
use crate::types::{ChannelId, GuildId};

const CONFIG_COLUMNS: &str =
    "guild_id, timezone, reset_time, afk_channel_id, created_at, updated_at";

pub async fn find_guild_config(
    pool: &PgPool,
    guild_id: &GuildId,
) -> Result<Option<GuildConfig>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM guild_configs WHERE guild_id = $1",
        CONFIG_COLUMNS
    );
    sqlx::query_as::<_, GuildConfig>(&query)
        .bind(guild_id)
        .fetch_optional(pool)
        .await
}

/// Returns the guild's config, creating a default row on first contact.
pub async fn get_or_create_guild_config(
    pool: &PgPool,
    guild_id: &GuildId,
    default_timezone: &Tz,
    default_reset_time: &str,
) -> Result<GuildConfig, sqlx::Error> {
    if let Some(existing) = find_guild_config(pool, guild_id).await? {
        return Ok(existing);
    }

    let defaults =
        GuildConfig::with_defaults(guild_id.clone(), default_timezone, default_reset_time, Utc::now());
    let query = format!(
        r#"
        INSERT INTO guild_configs
            (guild_id, timezone, reset_time, afk_channel_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (guild_id) DO UPDATE SET updated_at = guild_configs.updated_at
        RETURNING {}
        "#,
        CONFIG_COLUMNS
    );
    sqlx::query_as::<_, GuildConfig>(&query)
        .bind(&defaults.guild_id)
        .bind(&defaults.timezone)
        .bind(&defaults.reset_time)
        .bind(&defaults.afk_channel_id)
        .bind(defaults.created_at)
        .bind(defaults.updated_at)
        .fetch_one(pool)
        .await
}

pub async fn update_guild_config(
    pool: &PgPool,
    config: &GuildConfig,
) -> Result<GuildConfig, sqlx::Error> {
    let query = format!(
        r#"
        UPDATE guild_configs
        SET timezone = $1,
            reset_time = $2,
            afk_channel_id = $3,
            updated_at = $4
        WHERE guild_id = $5
        RETURNING {}
        "#,
        CONFIG_COLUMNS
    );
    sqlx::query_as::<_, GuildConfig>(&query)
        .bind(&config.timezone)
        .bind(&config.reset_time)
        .bind(&config.afk_channel_id)
        .bind(Utc::now())
        .bind(&config.guild_id)
        .fetch_one(pool)
        .await
}

pub async fn list_guild_configs(pool: &PgPool) -> Result<Vec<GuildConfig>, sqlx::Error> {
    let query = format!("SELECT {} FROM guild_configs ORDER BY guild_id", CONFIG_COLUMNS);
    sqlx::query_as::<_, GuildConfig>(&query).fetch_all(pool).await
}

/// Per-guild settings the tracker needs, behind a seam so tests can run
/// without a database.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GuildConfigProvider: Send + Sync {
    /// Resolves the guild's timezone. Infallible: unknown guilds and
    /// unreadable rows resolve to the application default.
    async fn guild_timezone(&self, guild_id: &GuildId) -> Tz;

    /// The guild's configured AFK channel, if any. Infallible: unreadable
    /// rows resolve to no AFK channel.
    async fn afk_channel(&self, guild_id: &GuildId) -> Option<ChannelId>;
}

pub struct PgGuildConfigProvider {
    pool: PgPool,
    default_timezone: Tz,
    default_reset_time: String,
}

impl PgGuildConfigProvider {
    pub fn new(pool: PgPool, default_timezone: Tz, default_reset_time: String) -> Self {
        Self {
            pool,
            default_timezone,
            default_reset_time,
        }
    }
}

#[async_trait]
impl GuildConfigProvider for PgGuildConfigProvider {
    async fn guild_timezone(&self, guild_id: &GuildId) -> Tz {
        match get_or_create_guild_config(
            &self.pool,
            guild_id,
            &self.default_timezone,
            &self.default_reset_time,
        )
        .await
        {
            Ok(config) => config.timezone(self.default_timezone),
            Err(err) => {
                tracing::warn!(%guild_id, error = %err, "failed to load guild config, using default timezone");
                self.default_timezone
            }
        }
    }

    async fn afk_channel(&self, guild_id: &GuildId) -> Option<ChannelId> {
        match find_guild_config(&self.pool, guild_id).await {
            Ok(config) => config.and_then(|c| c.afk_channel_id),
            Err(err) => {
                tracing::warn!(%guild_id, error = %err, "failed to load guild config for afk lookup");
                None
            }
        }
    }
}
