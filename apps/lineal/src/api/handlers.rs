//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.

use super::{
    AppState, CoreState,
    types::{
        EntityJson, ExecuteRequest, ExecuteResponse, FunctionListResponse, FunctionResponse,
        HealthResponse, HistoryResponse, LineageJson, LineagesResponse, RegisterRequest,
        RegisterResponse, ResolveResponse, StatusResponse, json_to_value, value_to_json,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use lineal_core::{AddressResolver, EcsId, LineageId, LinealError};
use serde::Deserialize;

/// Map a core error onto the HTTP status it should surface as.
fn error_status(error: &LinealError) -> StatusCode {
    match error {
        LinealError::AddressResolution { .. }
        | LinealError::EntityNotFound(_)
        | LinealError::UnregisteredFunction { .. } => StatusCode::NOT_FOUND,
        LinealError::DuplicateFunction { .. } => StatusCode::CONFLICT,
        LinealError::Execution { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_REQUEST,
    }
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// STATUS HANDLER
// =============================================================================

/// Get registry status.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let core = state.core.read().await;

    let response = StatusResponse {
        entity_count: core.registry.entity_count(),
        tree_count: core.registry.tree_count(),
        lineage_count: core.registry.lineage_count(),
        function_count: core.callables.len(),
    };

    (StatusCode::OK, Json(response))
}

// =============================================================================
// FUNCTION HANDLERS
// =============================================================================

/// List registered function names.
pub async fn functions_handler(State(state): State<AppState>) -> impl IntoResponse {
    let core = state.core.read().await;
    let response = FunctionListResponse {
        functions: core.callables.names(),
    };
    (StatusCode::OK, Json(response))
}

/// Fetch one function's declared input/output shapes.
pub async fn function_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    let core = state.core.read().await;
    match core.callables.spec(&name) {
        Some(spec) => (
            StatusCode::OK,
            Json(Some(FunctionResponse {
                name,
                spec: spec.clone(),
            })),
        ),
        None => (StatusCode::NOT_FOUND, Json(None)),
    }
}

// =============================================================================
// LINEAGE HANDLERS
// =============================================================================

/// List all lineages with their latest root ids.
pub async fn lineages_handler(State(state): State<AppState>) -> impl IntoResponse {
    let core = state.core.read().await;
    let response = LineagesResponse {
        lineages: core
            .registry
            .lineages()
            .into_iter()
            .map(|(lineage_id, latest_root)| LineageJson {
                lineage_id: lineage_id.0,
                latest_root: latest_root.0,
            })
            .collect(),
    };
    (StatusCode::OK, Json(response))
}

/// Fetch the full version history of one lineage.
pub async fn history_handler(
    State(state): State<AppState>,
    Path(lineage_id): Path<u64>,
) -> impl IntoResponse {
    let core = state.core.read().await;
    match core.registry.lineage_history(LineageId(lineage_id)) {
        Some(versions) => (
            StatusCode::OK,
            Json(Some(HistoryResponse {
                lineage_id,
                versions: versions.iter().map(|id| id.0).collect(),
            })),
        ),
        None => (StatusCode::NOT_FOUND, Json(None)),
    }
}

// =============================================================================
// ENTITY HANDLERS
// =============================================================================

/// Fetch one entity by root id and persistent id.
pub async fn entity_handler(
    State(state): State<AppState>,
    Path((root_id, ecs_id)): Path<(u64, u64)>,
) -> impl IntoResponse {
    let core = state.core.read().await;
    match core
        .registry
        .get_stored_entity(EcsId(root_id), EcsId(ecs_id))
    {
        Some(entity) => (StatusCode::OK, Json(Some(EntityJson::from_entity(&entity)))),
        None => (StatusCode::NOT_FOUND, Json(None)),
    }
}

/// Register a new root entity.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> impl IntoResponse {
    if request.kind.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(RegisterResponse::error("kind must be non-empty")),
        );
    }

    let entity = request.to_entity();
    let lineage_id = entity.lineage_id.0;

    let mut core = state.core.write().await;
    match core.registry.register_entity(&entity) {
        Ok(root_id) => (
            StatusCode::OK,
            Json(RegisterResponse::success(root_id.0, lineage_id)),
        ),
        Err(e) => (
            error_status(&e),
            Json(RegisterResponse::error(e.to_string())),
        ),
    }
}

// =============================================================================
// ADDRESS RESOLUTION HANDLER
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ResolveParams {
    pub address: String,
}

/// Resolve a string address against the registry.
pub async fn resolve_handler(
    State(state): State<AppState>,
    Query(params): Query<ResolveParams>,
) -> impl IntoResponse {
    let core = state.core.read().await;
    match AddressResolver::resolve(&core.registry, &params.address) {
        Ok(value) => (
            StatusCode::OK,
            Json(ResolveResponse::success(value_to_json(&value))),
        ),
        Err(e) => (error_status(&e), Json(ResolveResponse::error(e.to_string()))),
    }
}

// =============================================================================
// EXECUTE HANDLER
// =============================================================================

/// Execute a registered function.
///
/// The call runs on the blocking pool so a long-running callable never
/// stalls the async runtime; the write lock is held for the duration of
/// the call, serializing registry writers.
pub async fn execute_handler(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> impl IntoResponse {
    let core = state.core.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let args = request
            .args
            .iter()
            .map(|(name, value)| (name.clone(), json_to_value(value)))
            .collect();
        let mut guard = core.blocking_write();
        let CoreState {
            registry,
            callables,
        } = &mut *guard;
        callables.execute(registry, &request.function, args)
    })
    .await;

    match joined {
        Ok(Ok(outcome)) => {
            let response = ExecuteResponse {
                success: true,
                semantic: Some(outcome.semantic.as_str().to_string()),
                pattern: Some(format!("{:?}", outcome.pattern)),
                outputs: outcome.outputs.iter().map(EntityJson::from_entity).collect(),
                input_ecs_id: Some(outcome.input_ecs_id.0),
                audit_ecs_id: Some(outcome.audit_ecs_id.0),
                error: None,
            };
            (StatusCode::OK, Json(response))
        }
        Ok(Err(e)) => (error_status(&e), Json(ExecuteResponse::error(e.to_string()))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ExecuteResponse::error(format!("execution task failed: {e}"))),
        ),
    }
}
