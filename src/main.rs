use std::sync::{Arc, Mutex};

use axum::routing::{delete, get, post, put};
use axum::Router;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use autoshop::config::AppConfig;
use autoshop::db;
use autoshop::handlers;
use autoshop::services::notify::{NoopDispatcher, NotificationDispatcher, WebhookDispatcher};
use autoshop::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let notifier: Box<dyn NotificationDispatcher> = if config.notify_webhook_url.is_empty() {
        tracing::info!("no notification webhook configured, transitions are logged only");
        Box::new(NoopDispatcher)
    } else {
        tracing::info!("dispatching transition webhooks to {}", config.notify_webhook_url);
        Box::new(WebhookDispatcher::new(config.notify_webhook_url.clone()))
    };

    let (events_tx, _) = broadcast::channel(256);

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        notifier,
        events_tx,
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/slots", get(handlers::slots::get_slots))
        .route("/api/bookings", post(handlers::bookings::create_booking))
        .route("/api/bookings", get(handlers::bookings::list_bookings))
        .route("/api/bookings/:id", get(handlers::bookings::get_booking))
        .route(
            "/api/bookings/:id/cancel",
            post(handlers::bookings::cancel_booking),
        )
        .route("/api/mechanic/bookings", get(handlers::mechanic::list_jobs))
        .route(
            "/api/mechanic/bookings/:id/diagnose",
            post(handlers::mechanic::diagnose_booking),
        )
        .route(
            "/api/mechanic/bookings/:id/start",
            post(handlers::mechanic::start_booking),
        )
        .route(
            "/api/mechanic/bookings/:id/complete",
            post(handlers::mechanic::complete_booking),
        )
        .route(
            "/api/mechanic/bookings/:id/diagnosis",
            get(handlers::mechanic::get_diagnosis),
        )
        .route("/api/admin/bookings", get(handlers::admin::list_bookings))
        .route(
            "/api/admin/bookings/:id/approve",
            post(handlers::admin::approve_booking),
        )
        .route(
            "/api/admin/bookings/:id/assign",
            post(handlers::admin::assign_booking),
        )
        .route(
            "/api/admin/bookings/:id/cancel",
            post(handlers::admin::cancel_booking),
        )
        .route(
            "/api/admin/workshifts",
            get(handlers::workshifts::list_workshifts),
        )
        .route(
            "/api/admin/workshifts",
            post(handlers::workshifts::create_workshift),
        )
        .route(
            "/api/admin/workshifts/:id",
            put(handlers::workshifts::update_workshift),
        )
        .route(
            "/api/admin/workshifts/:id",
            delete(handlers::workshifts::delete_workshift),
        )
        .route("/api/admin/inventory", get(handlers::inventory::get_levels))
        .route(
            "/api/admin/inventory/receive",
            post(handlers::inventory::receive_stock),
        )
        .route(
            "/api/admin/service-parts",
            get(handlers::inventory::list_service_parts),
        )
        .route(
            "/api/admin/service-parts",
            post(handlers::inventory::create_service_part),
        )
        .route(
            "/api/admin/service-parts/:id",
            delete(handlers::inventory::delete_service_part),
        )
        .route("/api/admin/events", get(handlers::events::events_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
