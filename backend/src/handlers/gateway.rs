//! Ingest endpoints for the platform sidecar.
//!
//! The sidecar holds the actual platform connection and forwards raw
//! presence changes plus periodic full snapshots. Events are mirrored into
//! the gateway state synchronously, then queued for the tracker's single
//! consumer task.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::services::presence::{PresenceEvent, VoiceMember};
use crate::state::AppState;
use crate::types::GuildId;

pub async fn post_presence_event(
    State(state): State<AppState>,
    Json(event): Json<PresenceEvent>,
) -> Result<StatusCode, AppError> {
    state.gateway.apply_event(&event).await;

    state
        .events_tx
        .send(event)
        .await
        .map_err(|_| AppError::InternalServerError(anyhow::anyhow!("event consumer is gone")))?;

    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct SnapshotRequest {
    pub members: Vec<VoiceMember>,
}

pub async fn post_guild_snapshot(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
    Json(payload): Json<SnapshotRequest>,
) -> Result<StatusCode, AppError> {
    tracing::debug!(%guild_id, members = payload.members.len(), "applying guild snapshot");
    state.gateway.apply_snapshot(&guild_id, payload.members).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_guild(
    State(state): State<AppState>,
    Path(guild_id): Path<GuildId>,
) -> Result<StatusCode, AppError> {
    tracing::info!(%guild_id, "sidecar left guild, dropping presence mirror");
    state.gateway.remove_guild(&guild_id).await;
    Ok(StatusCode::NO_CONTENT)
}
