//! Daily time-quota evaluation for staff members.
//!
//! A member's total for a day is their productive (non-AFK) session minutes
//! plus the net of manual adjustments, floored at zero.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use sqlx::PgPool;
use std::sync::Arc;

use crate::models::adjustment::Adjustment;
use crate::models::session::Session;
use crate::models::staff_member::QuotaStanding;
use crate::repositories::guild_config::GuildConfigProvider;
use crate::repositories::{adjustment, session, staff_member};
use crate::types::GuildId;
use crate::utils::time::{local_date_at, Clock};

/// Productive session minutes plus signed adjustments, floored at zero.
pub fn total_minutes(
    sessions: &[Session],
    adjustments: &[Adjustment],
    now: DateTime<Utc>,
) -> i64 {
    let session_minutes: i64 = sessions
        .iter()
        .filter(|s| !s.is_afk)
        .map(|s| s.minutes_as_of(now))
        .sum();
    let adjusted: i64 = adjustments.iter().map(|a| a.signed_minutes()).sum();
    (session_minutes + adjusted).max(0)
}

pub struct QuotaService {
    pool: PgPool,
    configs: Arc<dyn GuildConfigProvider>,
    clock: Arc<dyn Clock>,
}

impl QuotaService {
    pub fn new(pool: PgPool, configs: Arc<dyn GuildConfigProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            configs,
            clock,
        }
    }

    /// Every active staff member's standing against their quota for the
    /// guild-local today. Members whose data cannot be loaded are logged
    /// and skipped.
    pub async fn evaluate_guild(&self, guild_id: &GuildId) -> Result<Vec<QuotaStanding>, sqlx::Error> {
        let tz: Tz = self.configs.guild_timezone(guild_id).await;
        let now = self.clock.now_utc();
        let today = local_date_at(&tz, now);

        let staff = staff_member::list_active_staff(&self.pool, guild_id).await?;
        let mut standings = Vec::with_capacity(staff.len());

        for member in &staff {
            let sessions = match session::list_sessions_for_user_on_date(
                &self.pool,
                &member.user_id,
                guild_id,
                today,
            )
            .await
            {
                Ok(sessions) => sessions,
                Err(err) => {
                    tracing::warn!(user_id = %member.user_id, %guild_id, error = %err, "failed to load sessions for quota check");
                    continue;
                }
            };
            let adjustments = match adjustment::list_adjustments_for_user_on_date(
                &self.pool,
                &member.user_id,
                guild_id,
                today,
            )
            .await
            {
                Ok(adjustments) => adjustments,
                Err(err) => {
                    tracing::warn!(user_id = %member.user_id, %guild_id, error = %err, "failed to load adjustments for quota check");
                    continue;
                }
            };

            standings.push(QuotaStanding::new(
                member,
                total_minutes(&sessions, &adjustments, now),
            ));
        }

        Ok(standings)
    }
}
