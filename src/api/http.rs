//! HTTP handlers and router
//!
//! A thin adapter over [`ReplicatedStore`]: decodes requests, calls the
//! store, maps errors to status codes with a JSON `{error}` body.

use crate::api::models::*;
use crate::common::{Config, Error};
use crate::storage::ReplicatedStore;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ReplicatedStore>,
    pub config: Arc<Config>,
}

/// Creates the HTTP router with all public endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/cluster", get(cluster_status))
        .route("/collections", get(list_collections))
        .route("/objects", put(put_object).get(list_objects))
        .route("/objects/:key", get(get_object).delete(delete_object))
        .with_state(state)
}

const DEFAULT_COLLECTION: &str = "default";

#[derive(Deserialize)]
struct CollectionQuery {
    collection: Option<String>,
}

impl CollectionQuery {
    fn collection(&self) -> &str {
        self.collection.as_deref().unwrap_or(DEFAULT_COLLECTION)
    }
}

fn error_response(err: Error) -> Response {
    (
        err.to_http_status(),
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.config.node_id.clone(),
        role: state.config.role.to_string(),
    })
}

async fn cluster_status(State(state): State<AppState>) -> Json<ClusterStatus> {
    let (replica_count, replica_health) = match state.store.manager() {
        Some(manager) => (
            Some(manager.participant_count()),
            Some(manager.health_check_all().await),
        ),
        None => (None, None),
    };

    Json(ClusterStatus {
        node_id: state.config.node_id.clone(),
        role: state.config.role.to_string(),
        version: crate::VERSION.to_string(),
        replica_count,
        replica_health,
    })
}

async fn list_collections(State(state): State<AppState>) -> Response {
    let names = match state.store.list_collections() {
        Ok(names) => names,
        Err(e) => return error_response(e),
    };

    let mut collections = Vec::with_capacity(names.len());
    for name in names {
        let keys = match state.store.count(&name) {
            Ok(keys) => keys,
            Err(e) => return error_response(e),
        };
        collections.push(CollectionInfo { name, keys });
    }

    Json(CollectionsResponse {
        count: collections.len(),
        collections,
    })
    .into_response()
}

async fn put_object(
    State(state): State<AppState>,
    Query(query): Query<CollectionQuery>,
    body: Result<Json<PutRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(body) => body,
        Err(_) => return bad_request("Invalid JSON body"),
    };

    if req.key.is_empty() {
        return bad_request("Key field is required");
    }

    match state
        .store
        .put(query.collection(), &req.key, &req.value)
        .await
    {
        Ok(()) => Json(PutResponse {
            message: "Object stored successfully".to_string(),
            key: req.key,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<CollectionQuery>,
) -> Response {
    match state.store.get(query.collection(), &key) {
        Ok(value) => Json(GetResponse { key, value }).into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_objects(
    State(state): State<AppState>,
    Query(query): Query<CollectionQuery>,
) -> Response {
    match state.store.list(query.collection()) {
        Ok(objects) => Json(ListResponse {
            count: objects.len(),
            objects,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<CollectionQuery>,
) -> Response {
    match state.store.delete(query.collection(), &key).await {
        Ok(()) => Json(DeleteResponse {
            message: "Object deleted successfully".to_string(),
            key,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}
