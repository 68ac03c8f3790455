//! HTTP request handlers

use axum::{
    extract::{Query, State},
    http::{HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use pairlink_session::{normalize_number, FailureCode, PairingReply};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::state::AppState;

const SERVICE_NAME: &str = "pairlink";
const CODE_MESSAGE: &str = "Enter this code on the device you are linking. It expires shortly.";
const MISSING_NUMBER_MESSAGE: &str = "A phone number with at least one digit is required.";

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let signature = HeaderValue::from_str(&state.config.signature).unwrap_or_else(|_| {
        warn!(
            "Signature {:?} is not a valid header value, using the service name",
            state.config.signature
        );
        HeaderValue::from_static(SERVICE_NAME)
    });

    Router::new()
        .route("/pair", get(pair_handler))
        .route("/health", get(health_handler))
        .route("/api/info", get(server_info_handler))
        .fallback(not_found_handler)
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-powered-by"),
            HeaderValue::from_static(SERVICE_NAME),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-signature"),
            signature,
        ))
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Pairing
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PairQuery {
    #[serde(default)]
    number: Option<String>,
}

/// Successful pairing response
#[derive(Debug, Serialize)]
pub struct PairCodeResponse {
    pub code: String,
    pub timestamp: String,
    pub message: String,
}

/// Failed pairing response
#[derive(Debug, Serialize)]
pub struct PairFailureResponse {
    pub code: FailureCode,
    pub message: String,
}

fn reply_response(reply: PairingReply) -> Response {
    match reply {
        PairingReply::Code { code, timestamp } => Json(PairCodeResponse {
            code,
            timestamp,
            message: CODE_MESSAGE.to_string(),
        })
        .into_response(),
        PairingReply::Failed { code, message } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(PairFailureResponse { code, message }),
        )
            .into_response(),
    }
}

/// Start a pairing session and answer with its pairing code
///
/// The session keeps running after the response is sent.
async fn pair_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PairQuery>,
) -> Response {
    let number = query.number.unwrap_or_default();
    if normalize_number(&number).is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(PairFailureResponse {
                code: FailureCode::Dispersion,
                message: MISSING_NUMBER_MESSAGE.to_string(),
            }),
        )
            .into_response();
    }

    info!("Pairing requested");
    reply_response(state.orchestrator.pair(&number).await)
}

// ============================================================================
// Service endpoints
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub success: bool,
    pub service: &'static str,
    pub timestamp: String,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        success: true,
        service: SERVICE_NAME,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Server information response
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    /// Server version
    pub version: String,
    /// Seconds since the server started
    pub uptime_secs: u64,
    /// Pairing sessions still running
    pub active_sessions: usize,
    /// Available endpoints
    pub endpoints: BTreeMap<&'static str, &'static str>,
}

async fn server_info_handler(State(state): State<Arc<AppState>>) -> Json<ServerInfo> {
    let endpoints = BTreeMap::from([
        ("pair", "GET /pair?number=<digits>"),
        ("health", "GET /health"),
        ("info", "GET /api/info"),
    ]);

    Json(ServerInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime().as_secs(),
        active_sessions: state.orchestrator.active_sessions(),
        endpoints,
    })
}

#[derive(Debug, Serialize)]
pub struct NotFoundResponse {
    pub error: &'static str,
    pub path: String,
}

async fn not_found_handler(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(NotFoundResponse {
            error: "Not found",
            path: uri.path().to_string(),
        }),
    )
}
