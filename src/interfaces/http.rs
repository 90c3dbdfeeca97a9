use crate::application::engine::TransactionEngine;
use crate::error::Result;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Read-only projection of the session slot: 200 when the acceptor is free,
/// 409 while a transaction is in progress.
async fn status(State(engine): State<Arc<TransactionEngine>>) -> impl IntoResponse {
    if engine.is_busy() {
        (
            StatusCode::CONFLICT,
            Json(json!({
                "status": "error",
                "message": "bill acceptor is mid-transaction"
            })),
        )
    } else {
        (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "message": "bill acceptor ready"
            })),
        )
    }
}

pub fn router(engine: Arc<TransactionEngine>) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .with_state(engine)
}

pub async fn serve(engine: Arc<TransactionEngine>, port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "status endpoint listening");
    axum::serve(listener, router(engine)).await?;
    Ok(())
}
