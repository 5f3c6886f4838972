use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;

use crate::error::AppError;
use crate::models::staff_member::{QuotaStanding, StaffMember, UpsertStaffRequest};
use crate::repositories::staff_member;
use crate::state::AppState;
use crate::types::{GuildId, UserId};

pub async fn put_staff_member(
    State(state): State<AppState>,
    Path((guild_id, user_id)): Path<(GuildId, UserId)>,
    Json(payload): Json<UpsertStaffRequest>,
) -> Result<Json<StaffMember>, AppError> {
    if payload.username.trim().is_empty() {
        return Err(AppError::BadRequest("Username cannot be empty".to_string()));
    }
    if let Some(required) = payload.required_minutes {
        if required < 0 {
            return Err(AppError::BadRequest(
                "Required minutes cannot be negative".to_string(),
            ));
        }
    }

    let existing = staff_member::find_staff_member(&state.pool, &user_id, &guild_id).await?;
    let now = Utc::now();
    let member = StaffMember {
        required_minutes: payload
            .required_minutes
            .or(existing.as_ref().map(|m| m.required_minutes))
            .unwrap_or(state.config.default_required_minutes),
        is_active: payload
            .is_active
            .or(existing.as_ref().map(|m| m.is_active))
            .unwrap_or(true),
        created_at: existing.as_ref().map(|m| m.created_at).unwrap_or(now),
        username: payload.username,
        user_id,
        guild_id,
        updated_at: now,
    };

    let saved = staff_member::upsert_staff_member(&state.pool, &member).await?;
    tracing::info!(
        user_id = %saved.user_id,
        guild_id = %saved.guild_id,
        required_minutes = saved.required_minutes,
        "staff member upserted"
    );
    Ok(Json(saved))
}

pub async fn list_staff(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
) -> Result<Json<Vec<StaffMember>>, AppError> {
    let members = staff_member::list_active_staff(&state.pool, &guild_id).await?;
    Ok(Json(members))
}

/// Today's quota standing for every active staff member, live sessions included.
pub async fn get_quota_status(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
) -> Result<Json<Vec<QuotaStanding>>, AppError> {
    let standings = state.quota.evaluate_guild(&guild_id).await?;
    Ok(Json(standings))
}
