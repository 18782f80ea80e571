use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paygate_server::{
    config::GatewayConfig, metrics::register_metrics, routes, state::open_store, state::AppState,
};

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    tracing::error!("{context}: {e}");
    std::io::Error::other(format!("{context}: {e}"))
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config =
        GatewayConfig::from_env().map_err(|e| startup_error("Failed to load configuration", e))?;
    let port = config.port;
    let allowed_origins = config.allowed_origins.clone();
    let rate_limit_rpm = config.rate_limit_rpm;

    tracing::info!("Starting x402-paygate on port {}", port);
    tracing::info!("Payment router: {:#x}", config.contract);

    // Initialize store
    let store = open_store(&config).map_err(|e| startup_error("Failed to open store", e))?;
    tracing::info!("Store initialized at: {}", config.db_path);

    // Register Prometheus metrics
    register_metrics();

    // Create shared state
    let state =
        AppState::new(config, store).map_err(|e| startup_error("Failed to build HTTP client", e))?;
    let state_data = web::Data::new(state);

    // Configure rate limiter
    let governor_conf = GovernorConfigBuilder::default()
        .requests_per_minute(rate_limit_rpm as u64)
        .finish()
        .ok_or_else(|| startup_error("Failed to create rate limiter config", "invalid rate"))?;

    HttpServer::new(move || {
        let cors = paygate_server::cors::build_cors(&allowed_origins);

        App::new()
            .app_data(state_data.clone())
            .wrap(Logger::default())
            .wrap(cors)
            .wrap(Governor::new(&governor_conf))
            .configure(routes::configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
