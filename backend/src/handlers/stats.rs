use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::session::SessionResponse;
use crate::repositories::{guild_config, session};
use crate::state::AppState;
use crate::types::{GuildId, UserId};
use crate::utils::time::{format_duration, format_duration_long, minutes_to_hours, today_local};

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct TodayResponse {
    pub user_id: UserId,
    pub guild_id: GuildId,
    pub date: NaiveDate,
    pub minutes: i64,
    /// Compact form for dashboards, e.g. "3h 5m".
    pub formatted: String,
    /// Spelled-out form for chat replies, e.g. "3 hours 5 minutes".
    pub formatted_long: String,
}

pub async fn get_member_today(
    State(state): State<AppState>,
    Path((guild_id, user_id)): Path<(GuildId, UserId)>,
) -> Result<Json<TodayResponse>, AppError> {
    let minutes = state
        .tracker
        .get_user_today_minutes(&user_id, &guild_id)
        .await?;
    let tz = guild_timezone(&state, &guild_id).await?;

    Ok(Json(TodayResponse {
        formatted: format_duration(minutes),
        formatted_long: format_duration_long(minutes),
        date: today_local(&tz),
        minutes,
        user_id,
        guild_id,
    }))
}

pub async fn list_member_sessions(
    State(state): State<AppState>,
    Path((guild_id, user_id)): Path<(GuildId, UserId)>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let tz = guild_timezone(&state, &guild_id).await?;
    let date = query.date.unwrap_or_else(|| today_local(&tz));

    let sessions =
        session::list_sessions_for_user_on_date(&state.pool, &user_id, &guild_id, date).await?;
    Ok(Json(sessions.into_iter().map(SessionResponse::from).collect()))
}

#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub username: String,
    pub minutes: i64,
    pub hours: f64,
    pub formatted: String,
}

pub async fn get_leaderboard(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let tz = guild_timezone(&state, &guild_id).await?;
    let date = query.date.unwrap_or_else(|| today_local(&tz));

    let totals = session::sum_minutes_by_guild_and_date(&state.pool, &guild_id, date).await?;
    let entries = totals
        .into_iter()
        .map(|(user_id, username, minutes)| LeaderboardEntry {
            user_id,
            username,
            hours: minutes_to_hours(minutes),
            formatted: format_duration(minutes),
            minutes,
        })
        .collect();
    Ok(Json(entries))
}

async fn guild_timezone(state: &AppState, guild_id: &GuildId) -> Result<chrono_tz::Tz, AppError> {
    let config = guild_config::get_or_create_guild_config(
        &state.pool,
        guild_id,
        &state.config.default_timezone,
        &state.config.default_reset_time,
    )
    .await?;
    Ok(config.timezone(state.config.default_timezone))
}
