use axum::{
    http::Method,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voicetrack_backend::config::Config;
use voicetrack_backend::db::connection::create_pool;
use voicetrack_backend::handlers;
use voicetrack_backend::repositories::guild_config::PgGuildConfigProvider;
use voicetrack_backend::repositories::session_store::PgSessionStore;
use voicetrack_backend::services::presence::GatewayState;
use voicetrack_backend::services::quota::QuotaService;
use voicetrack_backend::services::scheduler::Scheduler;
use voicetrack_backend::services::voice_tracker::{spawn_event_consumer, VoiceTracker};
use voicetrack_backend::state::AppState;
use voicetrack_backend::utils::time::SystemClock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voicetrack_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        database_url = %config.database_url,
        bind_addr = %config.bind_addr,
        default_timezone = %config.default_timezone,
        default_reset_time = %config.default_reset_time,
        default_required_minutes = config.default_required_minutes,
        startup_grace_secs = config.startup_grace_secs,
        "Loaded configuration from environment/.env"
    );

    // Initialize database
    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Wire up tracking services
    let gateway = Arc::new(GatewayState::new());
    let store = Arc::new(PgSessionStore::new(pool.clone()));
    let configs = Arc::new(PgGuildConfigProvider::new(
        pool.clone(),
        config.default_timezone,
        config.default_reset_time.clone(),
    ));
    let clock = Arc::new(SystemClock);
    let tracker = Arc::new(VoiceTracker::new(
        store,
        gateway.clone(),
        configs.clone(),
        clock.clone(),
    ));
    let quota = Arc::new(QuotaService::new(pool.clone(), configs, clock.clone()));

    let (events_tx, events_rx) = mpsc::channel(1024);

    // Give the sidecar a moment to push its initial snapshots so startup
    // reconciliation sees real presence instead of an empty mirror. Events
    // arriving meanwhile queue in the channel until the consumer starts.
    {
        let tracker = tracker.clone();
        let grace = Duration::from_secs(config.startup_grace_secs);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            tracker.recover_active_sessions().await;
            tracker.scan_current_voice_channels().await;
            spawn_event_consumer(tracker, events_rx);
        });
    }

    let scheduler = Arc::new(Scheduler::new(
        pool.clone(),
        config.clone(),
        tracker.clone(),
        quota.clone(),
        clock,
    ));
    scheduler.spawn();

    let state = AppState {
        pool,
        config: config.clone(),
        tracker,
        gateway,
        quota,
        events_tx,
    };

    // Sidecar ingest routes
    let gateway_routes = Router::new()
        .route("/api/gateway/events", post(handlers::gateway::post_presence_event))
        .route(
            "/api/gateway/guilds/{guild_id}/snapshot",
            post(handlers::gateway::post_guild_snapshot),
        )
        .route(
            "/api/gateway/guilds/{guild_id}",
            delete(handlers::gateway::delete_guild),
        );

    // Chat/dashboard read and admin routes
    let api_routes = Router::new()
        .route(
            "/api/guilds/{guild_id}/config",
            get(handlers::config::get_guild_config).put(handlers::config::put_guild_config),
        )
        .route(
            "/api/guilds/{guild_id}/members/{user_id}/today",
            get(handlers::stats::get_member_today),
        )
        .route(
            "/api/guilds/{guild_id}/members/{user_id}/sessions",
            get(handlers::stats::list_member_sessions),
        )
        .route(
            "/api/guilds/{guild_id}/leaderboard",
            get(handlers::stats::get_leaderboard),
        )
        .route(
            "/api/guilds/{guild_id}/staff",
            get(handlers::staff::list_staff),
        )
        .route(
            "/api/guilds/{guild_id}/staff/{user_id}",
            put(handlers::staff::put_staff_member),
        )
        .route(
            "/api/guilds/{guild_id}/staff/status",
            get(handlers::staff::get_quota_status),
        )
        .route(
            "/api/guilds/{guild_id}/members/{user_id}/adjustments",
            post(handlers::adjustments::post_adjustment)
                .get(handlers::adjustments::list_adjustments),
        );

    // Compose app with shared layers (CORS/Trace) and shared state
    let app = Router::new()
        .merge(gateway_routes)
        .merge(api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods([
                            Method::GET,
                            Method::POST,
                            Method::PUT,
                            Method::DELETE,
                            Method::OPTIONS,
                        ])
                        .allow_headers(Any)
                        .max_age(std::time::Duration::from_secs(24 * 60 * 60)),
                ),
        )
        .with_state(state);

    // Start server
    tracing::info!("Server listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
