//! Inbound HTTP surface.
//!
//! `POST /addUser` syncs a single MixItUp user into the user table. Every
//! other request is treated as an inbound chat message and recorded.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::mixitup::MixItUpClient;
use crate::payload::Payload;
use crate::platform::{ingest, ConversationStore, IncomingMessage};
use crate::users::{SyncOutcome, UserSync};
use crate::webhook::WebhookClient;

pub const REGISTRATION_MESSAGE: &str = "Sending test message to Mixitup webhook";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConversationStore>,
    pub users: UserSync,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid JSON Body")]
    InvalidJson,
    #[error("Invalid body")]
    InvalidBody,
    #[error("Missing required fields")]
    MissingFields,
    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidJson | Self::InvalidBody | Self::MissingFields => StatusCode::BAD_REQUEST,
            Self::Internal(e) => {
                error!("Request failed: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/addUser", post(add_user).fallback(ingest_message))
        .fallback(ingest_message)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn add_user(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let body: Value = serde_json::from_slice(&body).map_err(|_| ApiError::MissingFields)?;
    let (Some(user_id), Some(conversation_id)) = (
        required_str(&body, "mixitupUserId"),
        required_str(&body, "conversationId"),
    ) else {
        return Err(ApiError::MissingFields);
    };

    info!(
        "Syncing MixItUp user {} for conversation {}",
        user_id, conversation_id
    );
    let outcome: SyncOutcome = state.users.upsert_user(user_id).await;
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((status, Json(outcome)).into_response())
}

fn required_str<'a>(body: &'a Value, name: &str) -> Option<&'a str> {
    body.get(name)
        .and_then(Value::as_str)
        .filter(|v| !v.trim().is_empty())
}

async fn ingest_message(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let raw: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        &body
    };

    let value: Value = serde_json::from_slice(raw).map_err(|_| ApiError::InvalidJson)?;
    let incoming: IncomingMessage = serde_json::from_value(value).map_err(|e| {
        warn!("Rejected inbound message: {}", e);
        ApiError::InvalidBody
    })?;

    let message = ingest(state.store.as_ref(), &incoming).await?;
    info!(
        "Stored message {} from user {} in conversation {}",
        message.id, incoming.user_id, incoming.conversation_id
    );
    Ok(Json(json!({ "message": message })))
}

/// Startup check: one test message through the webhook, then the MixItUp
/// status endpoint. Either failing aborts start-up.
pub async fn register(webhook: &WebhookClient, mixitup: &MixItUpClient) -> anyhow::Result<()> {
    webhook.send(&Payload::text(REGISTRATION_MESSAGE)).await?;
    info!("Test message delivered to the MixItUp webhook");

    let version = mixitup.check_status().await?;
    info!("MixItUp endpoint is responsive (version {})", version.trim());
    Ok(())
}

pub async fn run(listener: TcpListener, app: Router) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!(address = %addr, "HTTP server starting");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
