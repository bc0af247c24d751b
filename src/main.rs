mod app_state;
mod config;
mod db;
mod models;
mod routes;
mod services;

use axum::response::Html;
use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use db::queries::PgJobRepository;
use services::lifecycle::LifecycleController;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing haul-dispatch server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("jobs_created_total", "Total purchase orders created");
    metrics::describe_counter!("job_transitions_total", "Total committed status transitions");
    metrics::describe_counter!(
        "geofence_evaluations_total",
        "Total location samples evaluated against a pickup geofence"
    );
    metrics::describe_histogram!(
        "geofence_evaluation_seconds",
        "Time to evaluate one location sample"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Wire the lifecycle engine to the Postgres-backed repository
    let repo = Arc::new(PgJobRepository::new(db_pool));
    let lifecycle = LifecycleController::new(repo.clone(), config.missing_geofence_policy);
    let state = AppState::new(repo, lifecycle);

    tracing::info!(
        policy = ?config.missing_geofence_policy,
        "Lifecycle controller ready"
    );

    // Build API routes
    let metrics_handle = prometheus_handle.clone();
    let app = Router::new()
        // Static UI (embedded at compile time)
        .route("/", get(|| async { Html(include_str!("../static/index.html")) }))
        // API endpoints
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/jobs", post(routes::jobs::create_job))
        .route("/api/v1/jobs/{job_id}", get(routes::jobs::get_job))
        .route("/api/v1/jobs/{job_id}/accept", post(routes::jobs::accept_job))
        .route(
            "/api/v1/jobs/{job_id}/transition",
            post(routes::jobs::transition_job),
        )
        .route(
            "/api/v1/jobs/{job_id}/location",
            post(routes::jobs::push_location),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(move || {
                let handle = metrics_handle.clone();
                async move { handle.render() }
            }),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024)); // 1 MB limit

    tracing::info!("Starting haul-dispatch on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
