mod application;
mod config;
mod domain;
mod infrastructure;
mod persistence;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::application::handlers::decision_handler::{
    get_metrics, health_check, post_decision, AppState,
};
use crate::config::{CoordinatorConfig, ServerConfig};
use crate::domain::services::coordinator::DecisionCoordinator;
use crate::infrastructure::http_price_oracle::HttpPriceOracle;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arbiter=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let server_config = ServerConfig::from_env();
    let coordinator_config = CoordinatorConfig::from_env();

    info!("Trading decision coordinator starting");
    info!(
        "Gates: price_stale_max={}ms spread_threshold={}bps allocation={:.2}EUR paper_trading={}",
        coordinator_config.price_stale_max_ms,
        coordinator_config.spread_threshold_bps,
        coordinator_config.trade_allocation_eur,
        coordinator_config.paper_trading,
    );

    let pool = persistence::init_database(&server_config.database_url).await?;
    let oracle = Arc::new(HttpPriceOracle::new(server_config.price_api_url.clone()));
    let coordinator = Arc::new(DecisionCoordinator::new(
        pool.clone(),
        oracle,
        coordinator_config,
    ));

    let state = AppState { coordinator, pool };

    let app = Router::new()
        .route("/", get(|| async { "Trading decision coordinator is running" }))
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .route("/decision", post(post_decision))
        // CORS layer answers OPTIONS preflight with an empty body
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("Listening on {}", server_config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&server_config.bind_addr).await?;
    let server = axum::serve(listener, app);

    let shutdown_signal = async move {
        let ctrl_c = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C signal"),
                Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                    info!("Received SIGTERM signal");
                }
                Err(e) => error!("Failed to install SIGTERM handler: {}", e),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    };

    server.with_graceful_shutdown(shutdown_signal).await?;

    info!("Shutdown complete");
    Ok(())
}
