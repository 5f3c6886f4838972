//! Staff roster entries subject to daily time quotas.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::{GuildId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StaffMember {
    pub user_id: UserId,
    pub guild_id: GuildId,
    pub username: String,
    /// Daily quota in minutes.
    pub required_minutes: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertStaffRequest {
    pub username: String,
    pub required_minutes: Option<i64>,
    pub is_active: Option<bool>,
}

/// One staff member's standing against their daily quota.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaStanding {
    pub user_id: UserId,
    pub username: String,
    pub required_minutes: i64,
    pub total_minutes: i64,
    pub met: bool,
    pub shortfall_minutes: i64,
}

impl QuotaStanding {
    pub fn new(member: &StaffMember, total_minutes: i64) -> Self {
        let shortfall = (member.required_minutes - total_minutes).max(0);
        Self {
            user_id: member.user_id.clone(),
            username: member.username.clone(),
            required_minutes: member.required_minutes,
            total_minutes,
            met: shortfall == 0,
            shortfall_minutes: shortfall,
        }
    }
}
