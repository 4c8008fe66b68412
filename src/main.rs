//! LendFlow Backend Server
//!
//! Rust backend for the LendFlow loan-origination and servicing platform:
//! loan application review workflow, EMI scheduling, the payment ledger,
//! penalty accrual, and document metadata.

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use lendflow_server::auth::AuthService;
use lendflow_server::config::Config;
use lendflow_server::document_service::{DocumentService, StorageClient};
use lendflow_server::emi::DailyRatePolicy;
use lendflow_server::loan_service::{penalty_sweep, LoanService};
use lendflow_server::middleware::{self, RateLimiter};
use lendflow_server::state::AppState;
use lendflow_server::user_service::UserService;
use lendflow_server::{db, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .init();

    tracing::info!(environment = %config.environment.as_str(), "Starting LendFlow backend");

    // Initialize database connection pool and apply migrations
    let db_pool = db::create_pool(&config)
        .await
        .context("Failed to connect to database")?;
    db::run_migrations(&db_pool)
        .await
        .context("Failed to run migrations")?;

    // Initialize services
    let auth_service = Arc::new(AuthService::new(db_pool.clone(), config.jwt_secret.clone()));

    let penalty_policy = Arc::new(DailyRatePolicy::new(config.penalty_daily_rate_bps));
    let loan_service = Arc::new(LoanService::new(db_pool.clone(), penalty_policy));

    let user_service = Arc::new(UserService::new(db_pool.clone()));

    let storage = StorageClient::new(
        config.storage_signing_url.clone(),
        config.storage_api_key.clone(),
    );
    let document_service = Arc::new(DocumentService::new(db_pool.clone(), storage));

    // Create shared app state
    let app_state = AppState::new(
        auth_service,
        loan_service.clone(),
        user_service,
        document_service,
    );

    // Start the recurring penalty sweep in the background
    let sweep_interval = Duration::from_secs(config.penalty_sweep_interval_secs);
    tokio::spawn(async move {
        tracing::info!(interval_secs = sweep_interval.as_secs(), "Penalty sweep task started");
        penalty_sweep(loan_service, sweep_interval).await;
    });

    // Clone db_pool for health check
    let health_db_pool = db_pool.clone();

    // Initialize rate limiter
    let rate_limiter = RateLimiter::new(config.rate_limit_rps);

    // Create the app router
    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(move || health_check(health_db_pool.clone())))
        .merge(routes::account_routes())
        .merge(routes::loan_routes())
        .merge(routes::emi_routes())
        .merge(routes::document_routes())
        .with_state(app_state)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
        .layer(axum::middleware::from_fn(move |req, next| {
            let limiter = rate_limiter.clone();
            middleware::rate_limit_layer(limiter)(req, next)
        }))
        .layer(configure_cors(&config));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind listener")?;

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

async fn root() -> &'static str {
    "LendFlow API Server"
}

/// Health check response
#[derive(serde::Serialize)]
struct HealthResponse {
    status: String,
    database: String,
    version: String,
}

/// Health check endpoint
async fn health_check(pool: sqlx::PgPool) -> axum::Json<HealthResponse> {
    let db_status = match db::check_health(&pool).await {
        Ok(()) => "connected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    let status = if db_status == "connected" {
        "healthy"
    } else {
        "unhealthy"
    };

    axum::Json(HealthResponse {
        status: status.to_string(),
        database: db_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn configure_cors(config: &Config) -> CorsLayer {
    let Some(allowed_origins_str) = config.cors_allowed_origins.as_deref() else {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    };

    let origins: Vec<HeaderValue> = allowed_origins_str
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
