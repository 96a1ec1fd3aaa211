//! HTTP routes.
//!
//! Thin surface: a health probe, the WebSocket upgrade, and the REST
//! fulfillment endpoint for clients that redeem a prompt over HTTP instead of
//! the socket. The actual result always arrives over the WebSocket.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use matjip_common::Error;

use crate::chat::ChatService;
use crate::dispatch::Dispatcher;
use crate::session::SessionRegistry;
use crate::suggest::SuggestionService;
use crate::ws::ws_handler;

// ============================================================================
// State
// ============================================================================

/// Shared state for the HTTP/WebSocket server.
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub chat: Arc<ChatService>,
    pub suggestions: Arc<SuggestionService>,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// Fulfillment request: redeem `analysisId` on behalf of `userId`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRequest {
    #[serde(default)]
    pub analysis_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

fn error_response(error: &Error) -> (StatusCode, Json<serde_json::Value>) {
    let status = StatusCode::from_u16(error.status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(serde_json::json!({ "error": error.to_string() })))
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "matjip-chat",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Accepts a fulfillment request and answers immediately; the card or a
/// rejection notice follows over the WebSocket.
async fn request_recommendation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RecommendationRequest>,
) -> impl IntoResponse {
    let analysis_id = request.analysis_id.unwrap_or_default();
    let user_id = request.user_id.unwrap_or_default();

    if analysis_id.trim().is_empty() {
        tracing::warn!("Missing analysisId in recommendation request");
        return error_response(&Error::InvalidInput("analysisId is required".into()));
    }
    if user_id.trim().is_empty() {
        tracing::warn!("Missing userId in recommendation request");
        return error_response(&Error::InvalidInput("userId is required".into()));
    }

    tracing::info!(analysis_id = %analysis_id, user_id = %user_id, "REST recommendation request received");

    let suggestions = state.suggestions.clone();
    tokio::spawn(async move {
        suggestions
            .provide_recommendation(&analysis_id, &user_id)
            .await;
    });

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "accepted",
            "message": "추천 요청이 접수되었습니다. 곧 WebSocket으로 결과를 받게 됩니다.",
        })),
    )
}

// ============================================================================
// Router
// ============================================================================

/// Build the service router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .route("/api/recommendations/request", post(request_recommendation))
        .with_state(state)
}
