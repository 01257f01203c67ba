use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{Json, Router, extract::State, routing::get};
use tokio::net::TcpListener;
use tracing::info;

use crate::sentinel::{Sentinel, SentinelStats};

pub fn router(sentinel: Arc<Sentinel>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/stats", get(stats))
        .with_state(sentinel)
}

async fn stats(State(sentinel): State<Arc<Sentinel>>) -> Json<SentinelStats> {
    Json(sentinel.stats())
}

/// Healthcheck + statystyki egzekucji.
pub async fn serve(addr: SocketAddr, sentinel: Arc<Sentinel>) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_listener(listener, sentinel).await
}

pub async fn serve_listener(listener: TcpListener, sentinel: Arc<Sentinel>) -> Result<()> {
    info!(addr = ?listener.local_addr().ok(), "http api listening");
    axum::serve(listener, router(sentinel)).await?;
    Ok(())
}
