// Demo HTTP API
// This file provides a small item API whose handlers are wrapped by the
// invocation interceptor, used by the binary to exercise instrumentation
//
// Numan Thabit 2025 Nov

use crate::intercept::{Interceptor, Policy};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router as AxumRouter,
};
use serde::{Deserialize, Serialize};

pub const LOOKUP_DURATION: &str = "api.items.lookup.duration";
pub const CREATE_COUNT: &str = "api.items.create";
pub const CREATE_FAILURES: &str = "api.items.create.errors";

#[derive(Clone)]
struct ApiState {
    interceptor: Interceptor,
    lookup: Policy,
    create: Policy,
    create_failures: Policy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Item {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

/// Create the HTTP router with API endpoints
pub fn create_api_router(interceptor: Interceptor) -> AxumRouter {
    let state = ApiState {
        interceptor,
        lookup: Policy::timer(LOOKUP_DURATION),
        create: Policy::count(CREATE_COUNT),
        create_failures: Policy::count_failures(CREATE_FAILURES),
    };
    AxumRouter::new()
        .route("/health", get(health_check))
        .route("/api/v1/items/:id", get(get_item))
        .route("/api/v1/items", post(create_item))
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Item lookup, timed
async fn get_item(
    State(state): State<ApiState>,
    Path(id): Path<u64>,
) -> Result<Json<Item>, ApiError> {
    let item = state
        .interceptor
        .call_async(&state.lookup, async move {
            if id == 0 {
                return Err(api_error(StatusCode::NOT_FOUND, "item 0 does not exist"));
            }
            Ok(Item {
                id,
                name: format!("item-{id}"),
            })
        })
        .await?;
    Ok(Json(item))
}

/// Item creation, counted per outcome and separately on failure
async fn create_item(
    State(state): State<ApiState>,
    Json(req): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<Item>), ApiError> {
    let interceptor = &state.interceptor;
    let item = interceptor.call(&state.create, || {
        interceptor.call(&state.create_failures, || {
            let name = req.name.trim();
            if name.is_empty() {
                return Err(api_error(StatusCode::BAD_REQUEST, "name must not be blank"));
            }
            Ok(Item {
                id: name.len() as u64,
                name: name.to_string(),
            })
        })
    })?;
    Ok((StatusCode::CREATED, Json(item)))
}
