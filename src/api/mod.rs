// HTTP and WebSocket APIs

pub mod query;
pub mod websocket;

pub use query::{create_query_router, QueryAppState};
pub use websocket::{create_ws_router, ws_handler, WsAppState};

use crate::hub::{ChannelRegistry, HubHandle};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Full HTTP surface: channel sockets plus read-only state queries
pub fn create_app(hub: HubHandle, channels: Arc<ChannelRegistry>) -> Router {
    let ws_state = Arc::new(WsAppState {
        hub: hub.clone(),
        channels,
    });
    let query_state = Arc::new(QueryAppState { hub });

    Router::new()
        .merge(create_ws_router(ws_state))
        .merge(create_query_router(query_state))
        .layer(CorsLayer::permissive())
}
