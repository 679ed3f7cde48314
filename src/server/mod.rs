//! HTTP 서버 - `POST /predict` 질의응답 엔드포인트
//!
//! 요청마다 독립된 태스크에서 파이프라인을 실행합니다.
//! 파이프라인 실패는 이미 `"query failed: ..."` 응답 텍스트로 바뀌어 200으로 나가고,
//! 태스크 자체가 실패한 경우에만 500 `{"detail": ...}`을 돌려줍니다.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::assistant::ChatAssistant;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PredictResponse {
    pub response: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, detail) = match &self {
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// 라우터 생성
pub fn router(assistant: Arc<ChatAssistant>) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(assistant)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn predict(
    State(assistant): State<Arc<ChatAssistant>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    tracing::info!("Received question: {}", request.question);

    let handle = tokio::spawn(async move { assistant.answer(&request.question).await });
    let response = handle.await.map_err(|e| {
        tracing::error!("Prediction task failed: {}", e);
        ApiError::internal(e)
    })?;

    Ok(Json(PredictResponse { response }))
}

// ============================================================================
// Serve
// ============================================================================

/// 서버 실행 (Ctrl-C로 정상 종료)
pub async fn serve(assistant: Arc<ChatAssistant>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(assistant))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

// ============================================================================
// Tests
// ============================================================================
