use crate::hub::{ChannelRegistry, HubCommand, HubHandle};
use crate::subscription::ConnectionManager;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Path, Request, State,
    },
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

/// Shared application state for WebSocket handler
#[derive(Clone)]
pub struct WsAppState {
    pub hub: HubHandle,
    pub channels: Arc<ChannelRegistry>,
}

/// Rejects unknown channels with 404 before the upgrade is attempted
async fn channel_guard(
    State(state): State<Arc<WsAppState>>,
    Path(channel): Path<String>,
    req: Request,
    next: Next,
) -> Response {
    if state.channels.get(&channel).is_none() {
        return (StatusCode::NOT_FOUND, "Unknown channel").into_response();
    }
    next.run(req).await
}

/// GET /ws/:channel - WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(channel): Path<String>,
    State(state): State<Arc<WsAppState>>,
) -> Response {
    info!(channel = %channel, "WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, channel, state))
}

/// Create WebSocket router with the channel guard applied
pub fn create_ws_router(state: Arc<WsAppState>) -> Router {
    Router::new()
        .route("/ws/:channel", get(ws_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), channel_guard))
        .with_state(state)
}

/// Register the connection with the hub and pump it until it closes
async fn handle_socket(socket: WebSocket, channel: String, state: Arc<WsAppState>) {
    let connection = Uuid::new_v4();
    let (outbox, outbox_rx) = mpsc::unbounded_channel();

    if !state.hub.send(HubCommand::Connect {
        channel,
        connection,
        outbox,
    }) {
        error!(connection = %connection, "Hub unavailable, dropping connection");
        return;
    }

    ConnectionManager::new(connection, state.hub.clone())
        .handle(socket, outbox_rx)
        .await;
}
