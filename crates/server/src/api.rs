use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use stratus_core::{ChatReply, ChatRequest, GatewayError};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};

use crate::gateway::Gateway;
use crate::health;

pub const CLIENT_HEADER: &str = "x-forwarded-for";
pub const API_KEY_HEADER: &str = "x-api-key";
pub const DEADLINE_HEADER: &str = "x-request-timeout-ms";
pub const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Clone)]
pub struct ApiState {
    pub gateway: Arc<Gateway>,
    pub request_timeout: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

#[derive(Debug)]
pub struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(value: GatewayError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            GatewayError::RateLimited(_) => {
                (StatusCode::TOO_MANY_REQUESTS, self.0.user_message().to_string())
            }
            GatewayError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, self.0.user_message().to_string())
            }
            GatewayError::InvalidRequest(reason) => {
                (StatusCode::UNPROCESSABLE_ENTITY, reason.clone())
            }
        };
        (status, Json(ErrorBody { detail })).into_response()
    }
}

pub fn router(state: ApiState, cors_permissive: bool) -> Router {
    let router = Router::new()
        .route("/chat", post(chat))
        .merge(health::router())
        .with_state(state);

    if cors_permissive {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

pub async fn chat(
    State(state): State<ApiState>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    state.gateway.authorize(header_value(&headers, API_KEY_HEADER))?;

    let Json(request) = payload.map_err(|rejection| {
        debug!(
            event_name = "gateway.request.rejected_body",
            error = %rejection,
            "invalid chat body"
        );
        GatewayError::InvalidRequest(rejection.body_text())
    })?;

    let client = client_identity(&headers);
    let deadline = request_deadline(&headers).unwrap_or(state.request_timeout);

    // Dropping the handler future (client went away) cancels in-flight provider work.
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let turn = state.gateway.handle(request, &client, &cancel);
    tokio::pin!(turn);

    let reply = tokio::select! {
        result = &mut turn => result?,
        _ = tokio::time::sleep(deadline) => {
            warn!(
                event_name = "gateway.request.deadline_exceeded",
                client_id = %client,
                deadline_ms = deadline.as_millis() as u64,
                "request deadline reached, cancelling in-flight work"
            );
            cancel.cancel();
            turn.await?
        }
    };

    Ok(Json(reply))
}

/// First hop of `x-forwarded-for`, or a shared bucket when the header is absent.
pub fn client_identity(headers: &HeaderMap) -> String {
    header_value(headers, CLIENT_HEADER)
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

fn request_deadline(headers: &HeaderMap) -> Option<Duration> {
    header_value(headers, DEADLINE_HEADER)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|millis| *millis > 0)
        .map(Duration::from_millis)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
