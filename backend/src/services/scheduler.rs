//! Background scheduling of per-guild daily resets.
//!
//! Two loops: a per-minute tick that fires each guild's reset once per
//! guild-local day at its configured "HH:MM" reset time, and an hourly
//! safety net that splits every configured guild in case a reset tick was
//! missed (process stall, clock jump). Both call into the tracker; the
//! split itself is idempotent so overlapping triggers are harmless.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::models::guild_config::GuildConfig;
use crate::repositories::guild_config::list_guild_configs;
use crate::services::quota::QuotaService;
use crate::services::voice_tracker::VoiceTracker;
use crate::types::GuildId;
use crate::utils::time::{parse_reset_time, Clock};

pub struct Scheduler {
    pool: PgPool,
    config: Config,
    tracker: Arc<VoiceTracker>,
    quota: Arc<QuotaService>,
    clock: Arc<dyn Clock>,
}

/// Returns the guild-local date to latch when the guild's daily reset is
/// due at `now`: its local reset time has passed and it has not run on the
/// current local date yet. Comparing against "has passed" rather than exact
/// equality makes a missed minute tick catch up on the next one, and fires
/// immediately after a restart when the reset time already elapsed today.
fn reset_due(
    guild_config: &GuildConfig,
    default_timezone: Tz,
    default_reset_time: &str,
    last_reset: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> Option<NaiveDate> {
    let tz = guild_config.timezone(default_timezone);
    let local = now.with_timezone(&tz);
    let today = local.date_naive();

    let (hours, minutes) = parse_reset_time(&guild_config.reset_time)
        .or_else(|| parse_reset_time(default_reset_time))
        .unwrap_or((0, 0));
    let reset_at = NaiveTime::from_hms_opt(hours, minutes, 0).unwrap_or(NaiveTime::MIN);

    if local.time() >= reset_at && last_reset != Some(today) {
        Some(today)
    } else {
        None
    }
}

impl Scheduler {
    pub fn new(
        pool: PgPool,
        config: Config,
        tracker: Arc<VoiceTracker>,
        quota: Arc<QuotaService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            config,
            tracker,
            quota,
            clock,
        }
    }

    /// Spawns the reset and safety-net loops. Runs until the process exits.
    pub fn spawn(self: Arc<Self>) {
        let scheduler = Arc::clone(&self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last_reset: HashMap<GuildId, NaiveDate> = HashMap::new();
            loop {
                interval.tick().await;
                scheduler.run_due_resets(&mut last_reset).await;
            }
        });

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60 * 60));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                self.run_safety_split().await;
            }
        });
        tracing::info!("scheduler started");
    }

    /// Fires the daily reset for every guild whose reset is due per
    /// [`reset_due`], latching the guild-local date so each guild runs at
    /// most once per local day.
    async fn run_due_resets(&self, last_reset: &mut HashMap<GuildId, NaiveDate>) {
        let configs = match list_guild_configs(&self.pool).await {
            Ok(configs) => configs,
            Err(err) => {
                tracing::warn!(error = %err, "failed to list guild configs for reset tick");
                return;
            }
        };

        let now = self.clock.now_utc();
        for guild_config in configs {
            let due = reset_due(
                &guild_config,
                self.config.default_timezone,
                &self.config.default_reset_time,
                last_reset.get(&guild_config.guild_id).copied(),
                now,
            );
            if let Some(today) = due {
                last_reset.insert(guild_config.guild_id.clone(), today);
                self.run_guild_reset(&guild_config).await;
            }
        }
    }

    async fn run_guild_reset(&self, guild_config: &GuildConfig) {
        let guild_id = &guild_config.guild_id;
        let tz = guild_config.timezone(self.config.default_timezone);
        tracing::info!(%guild_id, timezone = %tz, "running daily reset");

        self.tracker.split_midnight_sessions(guild_id, &tz).await;

        match self.quota.evaluate_guild(guild_id).await {
            Ok(standings) => {
                for standing in standings.iter().filter(|s| !s.met) {
                    tracing::info!(
                        %guild_id,
                        user_id = %standing.user_id,
                        total_minutes = standing.total_minutes,
                        required_minutes = standing.required_minutes,
                        shortfall_minutes = standing.shortfall_minutes,
                        "staff member below daily quota"
                    );
                }
            }
            Err(err) => {
                tracing::warn!(%guild_id, error = %err, "quota evaluation failed");
            }
        }
    }

    /// Hourly defensive split across all guilds; a no-op for guilds whose
    /// sessions already carry the current local date.
    async fn run_safety_split(&self) {
        let configs = match list_guild_configs(&self.pool).await {
            Ok(configs) => configs,
            Err(err) => {
                tracing::warn!(error = %err, "failed to list guild configs for safety split");
                return;
            }
        };

        for guild_config in configs {
            let tz = guild_config.timezone(self.config.default_timezone);
            self.tracker
                .split_midnight_sessions(&guild_config.guild_id, &tz)
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn config_with_reset(timezone: &str, reset_time: &str) -> GuildConfig {
        GuildConfig::with_defaults(
            crate::types::GuildId::from("g1"),
            &timezone.parse().unwrap(),
            reset_time,
            Utc::now(),
        )
    }

    fn due(config: &GuildConfig, last: Option<NaiveDate>, now: &str) -> Option<NaiveDate> {
        reset_due(config, chrono_tz::UTC, "00:00", last, utc(now))
    }

    #[test]
    fn reset_fires_once_then_latches_for_the_local_date() {
        let config = config_with_reset("UTC", "06:00");

        let first = due(&config, None, "2024-06-01T06:00:30Z");
        assert_eq!(first, Some(date("2024-06-01")));
        // The next minute tick sees the latched date and stays quiet.
        assert_eq!(due(&config, first, "2024-06-01T06:01:30Z"), None);
        assert_eq!(due(&config, first, "2024-06-01T23:59:00Z"), None);
    }

    #[test]
    fn reset_fires_again_on_the_next_local_date() {
        let config = config_with_reset("UTC", "06:00");
        let yesterday = Some(date("2024-06-01"));
        assert_eq!(
            due(&config, yesterday, "2024-06-02T06:00:10Z"),
            Some(date("2024-06-02"))
        );
    }

    #[test]
    fn reset_catches_up_when_the_exact_minute_was_missed() {
        // Process stalled through 06:00; the 06:34 tick still fires. The
        // same comparison makes a fresh process fire immediately when the
        // reset time already elapsed before it started.
        let config = config_with_reset("UTC", "06:00");
        assert_eq!(
            due(&config, None, "2024-06-01T06:34:00Z"),
            Some(date("2024-06-01"))
        );
    }

    #[test]
    fn reset_waits_until_the_local_time_arrives() {
        let config = config_with_reset("UTC", "06:00");
        assert_eq!(due(&config, None, "2024-06-01T05:59:00Z"), None);
    }

    #[test]
    fn reset_uses_the_guild_local_date_not_utc() {
        // 20:00 UTC on June 1st is already 05:00 June 2nd in Tokyo, so a
        // midnight reset latched for June 1st fires again for June 2nd.
        let config = config_with_reset("Asia/Tokyo", "00:00");
        assert_eq!(
            reset_due(
                &config,
                chrono_tz::UTC,
                "00:00",
                Some(date("2024-06-01")),
                utc("2024-06-01T20:00:00Z"),
            ),
            Some(date("2024-06-02"))
        );
    }

    #[test]
    fn unparseable_reset_time_falls_back_to_the_default() {
        let config = config_with_reset("UTC", "not-a-time");
        assert_eq!(
            reset_due(
                &config,
                chrono_tz::UTC,
                "08:00",
                None,
                utc("2024-06-01T07:00:00Z"),
            ),
            None
        );
        assert_eq!(
            reset_due(
                &config,
                chrono_tz::UTC,
                "08:00",
                None,
                utc("2024-06-01T08:30:00Z"),
            ),
            Some(date("2024-06-01"))
        );
    }
}
