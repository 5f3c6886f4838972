//! Per-guild tracking configuration.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::{ChannelId, GuildId};
use crate::utils::time::parse_timezone;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GuildConfig {
    pub guild_id: GuildId,
    /// IANA timezone name. May be stale/invalid; resolve through
    /// [`GuildConfig::timezone`] which falls back to the app default.
    pub timezone: String,
    /// Local "HH:MM" clock time of the guild's daily reset.
    pub reset_time: String,
    /// Channel whose sessions are marked AFK, when configured.
    pub afk_channel_id: Option<ChannelId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GuildConfig {
    pub fn with_defaults(
        guild_id: GuildId,
        timezone: &Tz,
        reset_time: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            guild_id,
            timezone: timezone.to_string(),
            reset_time: reset_time.to_string(),
            afk_channel_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Resolves the stored timezone name, falling back to `default` when
    /// invalid so a bad row cannot stall tracking for the guild.
    pub fn timezone(&self, default: Tz) -> Tz {
        parse_timezone(&self.timezone, default)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateGuildConfigRequest {
    pub timezone: Option<String>,
    pub reset_time: Option<String>,
    /// Absent leaves the AFK channel as is; an explicit `null` clears it.
    #[serde(default, deserialize_with = "double_option")]
    pub afk_channel_id: Option<Option<ChannelId>>,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<ChannelId>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<ChannelId>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize)]
pub struct GuildConfigResponse {
    pub guild_id: GuildId,
    pub timezone: String,
    pub reset_time: String,
    pub afk_channel_id: Option<ChannelId>,
    /// Next instant the daily reset fires, in UTC.
    pub next_reset: Option<DateTime<Utc>>,
}

impl GuildConfigResponse {
    pub fn from_config(config: GuildConfig, default_timezone: Tz, now: DateTime<Utc>) -> Self {
        let tz = config.timezone(default_timezone);
        Self {
            next_reset: crate::utils::time::next_reset_time(&config.reset_time, &tz, now),
            guild_id: config.guild_id,
            timezone: config.timezone,
            reset_time: config.reset_time,
            afk_channel_id: config.afk_channel_id,
        }
    }
}
