use crate::scanner::MarketScanner;
use axum::{
    extract::State,
    response::Html,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub fn router(scanner: Arc<MarketScanner>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/ping", get(ping))
        .route("/api/status", get(status))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(scanner)
}

pub async fn serve(port: u16, scanner: Arc<MarketScanner>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Status server running on port {}", port);
    axum::serve(listener, router(scanner)).await
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "engulf-signals",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn ping() -> &'static str {
    "pong"
}

async fn status(State(s): State<Arc<MarketScanner>>) -> Json<serde_json::Value> {
    let universe = s.universe().last().await;
    Json(serde_json::json!({
        "trackedSignals": s.deduplicator().len().await,
        "signalsSent": s.signals_sent().await,
        "lastReset": s.deduplicator().last_reset().await.map(|t| t.to_rfc3339()),
        "universe": universe.as_ref().map(|u| u.symbols()),
        "rankings": universe,
        "timeframes": s.config().timeframes,
        "lastCycle": s.last_report().await,
    }))
}

async fn home(State(s): State<Arc<MarketScanner>>) -> Html<String> {
    let tracked = s.deduplicator().len().await;
    let last_reset = s
        .deduplicator()
        .last_reset()
        .await
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".into());
    let symbols = s
        .universe()
        .last()
        .await
        .map(|u| u.symbols().join(", "))
        .unwrap_or_default();

    Html(format!(
        "<h3>EMA Engulfing Monitor</h3>\n<p>Tracked signals: {}</p>\n<p>Last reset: {}</p>\n<p>Universe: {}</p>",
        tracked, last_reset, symbols
    ))
}
