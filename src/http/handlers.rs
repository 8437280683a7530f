//! Request handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, instrument};

use crate::identity::{IdentityResolver, RequestContext};
use crate::ratelimit::{Decision, WindowLimiter};

const ADMITTED_MESSAGE: &str = "Request successful!";
const RATE_LIMITED_MESSAGE: &str = "Rate limit exceeded. Try again later.";
const LIMITER_FAILED_MESSAGE: &str = "Rate limiter unavailable. Try again later.";

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<WindowLimiter>,
    pub resolver: Arc<IdentityResolver>,
}

impl AppState {
    pub fn new(limiter: Arc<WindowLimiter>, resolver: Arc<IdentityResolver>) -> Self {
        Self { limiter, resolver }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api", get(api_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /api`: answers 200 while the client is within its limit, 429 once
/// it is exceeded, and 503 when the limiter itself cannot decide.
#[instrument(skip_all)]
pub async fn api_handler(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let ctx = request_context(connect_info.map(|ConnectInfo(addr)| addr), &headers);
    let identity = state.resolver.resolve(&ctx);

    match state.limiter.check_and_consume(&identity).await {
        Ok(Decision::Admit) => {
            (StatusCode::OK, Json(json!({ "message": ADMITTED_MESSAGE }))).into_response()
        }
        Ok(Decision::Reject) => {
            debug!(identity = %identity, "Responding with 429");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "error": RATE_LIMITED_MESSAGE })),
            )
                .into_response()
        }
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": LIMITER_FAILED_MESSAGE })),
        )
            .into_response(),
    }
}

fn request_context(peer_addr: Option<SocketAddr>, headers: &HeaderMap) -> RequestContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };

    RequestContext {
        peer_addr,
        forwarded_for: header("x-forwarded-for"),
        real_ip: header("x-real-ip"),
    }
}
