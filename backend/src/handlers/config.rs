use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use chrono_tz::Tz;

use crate::error::AppError;
use crate::models::guild_config::{GuildConfigResponse, UpdateGuildConfigRequest};
use crate::repositories::guild_config;
use crate::state::AppState;
use crate::types::GuildId;
use crate::utils::time::parse_reset_time;

pub async fn get_guild_config(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
) -> Result<Json<GuildConfigResponse>, AppError> {
    let config = guild_config::get_or_create_guild_config(
        &state.pool,
        &guild_id,
        &state.config.default_timezone,
        &state.config.default_reset_time,
    )
    .await?;
    Ok(Json(GuildConfigResponse::from_config(
        config,
        state.config.default_timezone,
        Utc::now(),
    )))
}

pub async fn put_guild_config(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
    Json(payload): Json<UpdateGuildConfigRequest>,
) -> Result<Json<GuildConfigResponse>, AppError> {
    let mut config = guild_config::get_or_create_guild_config(
        &state.pool,
        &guild_id,
        &state.config.default_timezone,
        &state.config.default_reset_time,
    )
    .await?;

    if let Some(timezone) = payload.timezone {
        if timezone.parse::<Tz>().is_err() {
            return Err(AppError::BadRequest(format!(
                "Invalid timezone: {}. Must be a valid IANA timezone identifier",
                timezone
            )));
        }
        config.timezone = timezone;
    }

    if let Some(reset_time) = payload.reset_time {
        if parse_reset_time(&reset_time).is_none() {
            return Err(AppError::BadRequest(format!(
                "Invalid reset time: {}. Must be HH:MM",
                reset_time
            )));
        }
        config.reset_time = reset_time;
    }

    if let Some(afk_channel_id) = payload.afk_channel_id {
        config.afk_channel_id = afk_channel_id;
    }

    let updated = guild_config::update_guild_config(&state.pool, &config).await?;
    tracing::info!(%guild_id, timezone = %updated.timezone, reset_time = %updated.reset_time, "guild config updated");
    Ok(Json(GuildConfigResponse::from_config(
        updated,
        state.config.default_timezone,
        Utc::now(),
    )))
}
