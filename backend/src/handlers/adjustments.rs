use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::stats::DateQuery;
use crate::models::adjustment::{Adjustment, CreateAdjustmentRequest};
use crate::repositories::{adjustment, guild_config};
use crate::state::AppState;
use crate::types::{GuildId, UserId};
use crate::utils::time::today_local;

pub async fn post_adjustment(
    State(state): State<AppState>,
    Path((guild_id, user_id)): Path<(GuildId, UserId)>,
    Json(payload): Json<CreateAdjustmentRequest>,
) -> Result<(StatusCode, Json<Adjustment>), AppError> {
    if payload.minutes <= 0 {
        return Err(AppError::BadRequest(
            "Adjustment minutes must be positive".to_string(),
        ));
    }
    if payload.reason.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Adjustment reason cannot be empty".to_string(),
        ));
    }

    let record = Adjustment {
        id: Uuid::new_v4(),
        user_id,
        username: payload.username,
        guild_id,
        date: payload.date,
        minutes: payload.minutes,
        kind: payload.kind,
        reason: payload.reason,
        adjusted_by: payload.adjusted_by,
        created_at: Utc::now(),
    };
    adjustment::insert_adjustment(&state.pool, &record).await?;
    tracing::info!(
        user_id = %record.user_id,
        guild_id = %record.guild_id,
        minutes = record.signed_minutes(),
        date = %record.date,
        "adjustment recorded"
    );
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list_adjustments(
    State(state): State<AppState>,
    Path((guild_id, user_id)): Path<(GuildId, UserId)>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Vec<Adjustment>>, AppError> {
    let date = match query.date {
        Some(date) => date,
        None => {
            let config = guild_config::get_or_create_guild_config(
                &state.pool,
                &guild_id,
                &state.config.default_timezone,
                &state.config.default_reset_time,
            )
            .await?;
            today_local(&config.timezone(state.config.default_timezone))
        }
    };

    let records =
        adjustment::list_adjustments_for_user_on_date(&state.pool, &user_id, &guild_id, date)
            .await?;
    Ok(Json(records))
}
