use crate::hub::{HubHandle, StateQuery};
use crate::state::{CustomerView, EntityId, GlobalAggregates};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Shared state for query API
pub struct QueryAppState {
    pub hub: HubHandle,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create query API router
pub fn create_query_router(state: Arc<QueryAppState>) -> Router {
    Router::new()
        .route("/api/state/global", get(get_global))
        .route("/api/state/customers", get(list_customers))
        .route("/api/state/customers/:id", get(get_customer))
        .with_state(state)
}

/// GET /api/state/global - Overall distance and visit count
async fn get_global(
    State(state): State<Arc<QueryAppState>>,
) -> Result<Json<GlobalAggregates>, QueryError> {
    let global = state
        .hub
        .query(StateQuery::Global)
        .await
        .ok_or(QueryError::Unavailable)?;
    Ok(Json(global))
}

/// GET /api/state/customers - Latest sample per customer
async fn list_customers(
    State(state): State<Arc<QueryAppState>>,
) -> Result<Json<Value>, QueryError> {
    let list = state
        .hub
        .query(StateQuery::CustomerList)
        .await
        .ok_or(QueryError::Unavailable)?;
    Ok(Json(list))
}

/// GET /api/state/customers/:id - Today's history, visits, distance and name
async fn get_customer(
    State(state): State<Arc<QueryAppState>>,
    Path(id): Path<String>,
) -> Result<Json<CustomerView>, QueryError> {
    let entity_id = EntityId::new(id);
    let view = state
        .hub
        .query(|reply| StateQuery::Customer { entity_id, reply })
        .await
        .ok_or(QueryError::Unavailable)?
        .ok_or(QueryError::NotFound)?;
    Ok(Json(view))
}

/// Query error types
#[derive(Debug)]
enum QueryError {
    NotFound,
    Unavailable,
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            QueryError::NotFound => (StatusCode::NOT_FOUND, "Customer not seen today"),
            QueryError::Unavailable => (StatusCode::SERVICE_UNAVAILABLE, "Hub unavailable"),
        };

        (
            status,
            Json(ErrorResponse {
                error: message.to_string(),
            }),
        )
            .into_response()
    }
}
