//! Session records: one contiguous interval of a user's presence in one
//! voice channel.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::{ChannelId, GuildId, SessionId, UserId};
use crate::utils::time::session_duration_minutes;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    /// Display name snapshot taken at session open.
    pub username: String,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    /// Channel display name snapshot taken at session open; never refreshed.
    pub channel_name: String,
    pub join_time: DateTime<Utc>,
    /// `None` while the session is open.
    pub leave_time: Option<DateTime<Utc>>,
    /// Floor-truncated whole minutes; 0 while the session is open.
    pub duration_minutes: i64,
    /// Excludes the session from productive totals. Set at open when the
    /// channel is the guild's configured AFK channel.
    pub is_afk: bool,
    /// Guild-local calendar date the session is attributed to. Fixed at
    /// creation; the midnight split is the only way a continuous presence
    /// spans two dates.
    pub date: NaiveDate,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Opens a new session starting at `join_time`.
    pub fn open(
        user_id: UserId,
        username: String,
        guild_id: GuildId,
        channel_id: ChannelId,
        channel_name: String,
        join_time: DateTime<Utc>,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: SessionId::new(),
            user_id,
            username,
            guild_id,
            channel_id,
            channel_name,
            join_time,
            leave_time: None,
            duration_minutes: 0,
            is_afk: false,
            date,
            is_active: true,
            created_at: join_time,
            updated_at: join_time,
        }
    }

    /// Minutes this session contributes to a total as of `now`: the stored
    /// duration once closed, live elapsed time while open.
    pub fn minutes_as_of(&self, now: DateTime<Utc>) -> i64 {
        if self.is_active {
            session_duration_minutes(self.join_time, now)
        } else {
            self.duration_minutes
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub id: SessionId,
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub join_time: DateTime<Utc>,
    pub leave_time: Option<DateTime<Utc>>,
    pub duration_minutes: i64,
    pub is_afk: bool,
    pub date: NaiveDate,
    pub is_active: bool,
}

impl From<Session> for SessionResponse {
    fn from(s: Session) -> Self {
        Self {
            id: s.id,
            channel_id: s.channel_id,
            channel_name: s.channel_name,
            join_time: s.join_time,
            leave_time: s.leave_time,
            duration_minutes: s.duration_minutes,
            is_afk: s.is_afk,
            date: s.date,
            is_active: s.is_active,
        }
    }
}
