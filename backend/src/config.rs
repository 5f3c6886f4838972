use anyhow::anyhow;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub default_timezone: Tz,
    pub default_reset_time: String,
    pub default_required_minutes: i64,
    /// Seconds to wait for initial gateway snapshots before running startup
    /// reconciliation.
    pub startup_grace_secs: u64,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/voicetrack".to_string());

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let default_timezone_name =
            env::var("APP_TIMEZONE").unwrap_or_else(|_| "UTC".to_string());
        let default_timezone: Tz = default_timezone_name
            .parse()
            .map_err(|_| anyhow!("Invalid APP_TIMEZONE value: {}", default_timezone_name))?;

        let default_reset_time =
            env::var("DEFAULT_RESET_TIME").unwrap_or_else(|_| "00:00".to_string());
        if crate::utils::time::parse_reset_time(&default_reset_time).is_none() {
            return Err(anyhow!(
                "Invalid DEFAULT_RESET_TIME value: {}",
                default_reset_time
            ));
        }

        let default_required_minutes = env::var("DEFAULT_REQUIRED_MINUTES")
            .unwrap_or_else(|_| "360".to_string())
            .parse()
            .unwrap_or(360);

        let startup_grace_secs = env::var("STARTUP_GRACE_SECS")
            .unwrap_or_else(|_| "15".to_string())
            .parse()
            .unwrap_or(15);

        Ok(Config {
            database_url,
            bind_addr,
            default_timezone,
            default_reset_time,
            default_required_minutes,
            startup_grace_secs,
        })
    }
}
