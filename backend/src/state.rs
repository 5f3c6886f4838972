use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::mpsc;

use crate::{
    config::Config,
    services::{presence::GatewayState, presence::PresenceEvent, quota::QuotaService,
        voice_tracker::VoiceTracker},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub tracker: Arc<VoiceTracker>,
    pub gateway: Arc<GatewayState>,
    pub quota: Arc<QuotaService>,
    pub events_tx: mpsc::Sender<PresenceEvent>,
}
