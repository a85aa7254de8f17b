use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use slipit_server::config::Config;
use slipit_server::metadata::MetadataExtractor;
use slipit_server::router::{cors_layer, create_router};
use slipit_server::state::AppState;

#[tokio::main]
async fn main() {
    // JSON logs in production, human-readable in dev.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("slipit_server=info,tower_http=info"));

    if std::env::var("APP_ENV").as_deref() == Ok("production") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("🚀 Slipit server starting...");

    let config = Config::from_env().expect("Failed to load configuration");
    info!(
        fallback = %config.fallback,
        fetch_timeout_secs = config.fetch_timeout.as_secs(),
        "📝 Configuration loaded"
    );

    let extractor = MetadataExtractor::with_timeout(config.fetch_timeout, config.fallback)
        .expect("Failed to build HTTP client")
        .block_private_targets(config.block_private_targets);

    let app_state = AppState::new(extractor);
    let cors = cors_layer(&config);

    // Prometheus metrics layer
    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let app = create_router(app_state, cors, config.request_timeout)
        .route(
            "/metrics",
            get(move || async move { metric_handle.render() }),
        )
        .layer(prometheus_layer);

    let addr = config.server_addr();
    info!("🎧 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server failed to start");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {:?}", e);
        std::future::pending::<()>().await;
    }
    info!("🛑 Shutdown signal received");
}
