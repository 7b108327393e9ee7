//! HTTP server receiving push notifications.
//!
//! `POST /{notificationID}` with a JSON body
//! `{"characteristic": "...", "value": ..., "password": "..."}`.

use super::{Delivery, NotificationRegistry};
use crate::error::Result;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationBody {
    pub characteristic: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn create_router(registry: Arc<NotificationRegistry>) -> Router {
    Router::new()
        .route("/:notification_id", post(notification_handler))
        .with_state(registry)
}

async fn notification_handler(
    State(registry): State<Arc<NotificationRegistry>>,
    Path(notification_id): Path<String>,
    body: Bytes,
) -> Response {
    if !registry.is_registered(&notification_id) {
        return (StatusCode::NOT_FOUND, "unknown notification id\n").into_response();
    }

    let body: NotificationBody = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            debug!("[Notify] Malformed body for '{}': {}", notification_id, e);
            return (StatusCode::BAD_REQUEST, format!("malformed body: {}\n", e)).into_response();
        }
    };

    match registry.deliver(&notification_id, &body) {
        Delivery::Delivered => (StatusCode::OK, "ok\n").into_response(),
        Delivery::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized\n").into_response(),
        Delivery::UnknownId => (StatusCode::NOT_FOUND, "unknown notification id\n").into_response(),
    }
}

/// Notification HTTP server.
pub struct NotificationServer {
    registry: Arc<NotificationRegistry>,
    listen_addr: SocketAddr,
}

impl NotificationServer {
    pub fn new(registry: Arc<NotificationRegistry>, listen_addr: SocketAddr) -> Self {
        Self {
            registry,
            listen_addr,
        }
    }

    /// Run the server until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let router = create_router(self.registry);

        let listener = tokio::net::TcpListener::bind(self.listen_addr).await?;
        info!("[Notify] Listening on {}", self.listen_addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                info!("[Notify] Server shutting down");
            })
            .await?;

        Ok(())
    }
}
