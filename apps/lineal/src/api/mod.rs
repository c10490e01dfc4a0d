//! # Lineal HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET  /health` - Health check
//! - `GET  /status` - Registry counts
//! - `GET  /functions` - List registered functions
//! - `GET  /functions/{name}` - One function's declared shapes
//! - `GET  /lineages` - All lineages with latest root ids
//! - `GET  /lineages/{id}/history` - Full version history of a lineage
//! - `GET  /entities/{root_id}/{ecs_id}` - One entity checkout
//! - `GET  /resolve?address=@id.field` - Resolve a string address
//! - `POST /entities` - Register a root entity
//! - `POST /execute` - Execute a registered function
//!
//! ## Security Configuration
//!
//! Via the TOML config file or environment (env wins):
//! - `cors_origins` / `LINEAL_CORS_ORIGINS`: allowed origins, or "*" for all (default: localhost only)
//! - `rate_limit` / `LINEAL_RATE_LIMIT`: requests per second (default: 100, 0 to disable)
//! - `api_key` / `LINEAL_API_KEY`: if set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

// Re-exports for external use
pub use middleware::{GlobalRateLimiter, create_rate_limiter};
// Re-export handlers and types for integration tests (via `lineal::api::*`)
#[allow(unused_imports)]
pub use handlers::{
    entity_handler, execute_handler, function_handler, functions_handler, health_handler,
    history_handler, lineages_handler, register_handler, resolve_handler, status_handler,
};
#[allow(unused_imports)]
pub use types::{
    EntityJson, ExecuteRequest, ExecuteResponse, FunctionListResponse, FunctionResponse,
    HealthResponse, HistoryResponse, LineageJson, LineagesResponse, RegisterRequest,
    RegisterResponse, ResolveResponse, StatusResponse, json_to_value, value_to_json,
};

use crate::AppError;
use crate::config::ServerConfig;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use lineal_core::{
    CallableOutput, CallableRegistry, CallableSpec, Entity, EntityRegistry, FieldKind,
    LinealError, OutputShape, Shape, ShapeField, Value,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// The engine state: entity registry plus the callable table.
#[derive(Debug, Default)]
pub struct CoreState {
    /// The versioned entity store.
    pub registry: EntityRegistry,
    /// Registered callables.
    pub callables: CallableRegistry,
}

impl CoreState {
    /// Create empty state with no registered functions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create state with the demo callables registered and a sample
    /// student in the registry, for out-of-the-box experimentation.
    pub fn demo() -> Result<Self, LinealError> {
        let mut state = Self::new();
        register_demo_callables(&mut state.callables)?;

        let sample = Entity::new("Student")
            .with_field("name", "Ada")
            .with_field("gpa", 3.0);
        state.registry.register_entity(&sample)?;
        Ok(state)
    }
}

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    /// The engine, behind one coarse writer lock.
    pub core: Arc<RwLock<CoreState>>,
}

impl AppState {
    /// Create new app state around an engine.
    #[must_use]
    pub fn new(core: CoreState) -> Self {
        Self {
            core: Arc::new(RwLock::new(core)),
        }
    }
}

// =============================================================================
// DEMO CALLABLES
// =============================================================================

/// Register the built-in demo functions.
///
/// - `raise_gpa(student, amount)` - mutation: bumps a student's gpa
/// - `split_student(student)` - multi-output creation: name + score records
/// - `new_student(name, gpa)` - creation: a fresh student
pub fn register_demo_callables(callables: &mut CallableRegistry) -> Result<(), LinealError> {
    callables.register(
        "raise_gpa",
        CallableSpec {
            input_shape: Shape::new(
                "RaiseGpaInput",
                vec![
                    ShapeField::new("student", FieldKind::Entity("Student".to_string())),
                    ShapeField::new("amount", FieldKind::Float),
                ],
            ),
            output_shape: OutputShape::Single(Shape::new(
                "Student",
                vec![
                    ShapeField::new("name", FieldKind::Str),
                    ShapeField::new("gpa", FieldKind::Float),
                ],
            )),
        },
        |input| {
            let mut student = input
                .field("student")
                .and_then(Value::as_entity)
                .cloned()
                .ok_or(LinealError::InvalidTree {
                    reason: "raise_gpa requires a 'student' entity argument".to_string(),
                })?;
            let amount = input
                .field("amount")
                .and_then(Value::as_float)
                .unwrap_or(0.0);
            let gpa = student
                .field("gpa")
                .and_then(Value::as_float)
                .unwrap_or(0.0);
            student.set_field("gpa", gpa + amount);
            Ok(CallableOutput::Entity(student))
        },
    )?;

    callables.register(
        "split_student",
        CallableSpec {
            input_shape: Shape::new(
                "SplitStudentInput",
                vec![ShapeField::new(
                    "student",
                    FieldKind::Entity("Student".to_string()),
                )],
            ),
            output_shape: OutputShape::Siblings(vec![
                Shape::new("NameRecord", vec![ShapeField::new("name", FieldKind::Str)]),
                Shape::new("ScoreRecord", vec![ShapeField::new("gpa", FieldKind::Float)]),
            ]),
        },
        |input| {
            let student = input
                .field("student")
                .and_then(Value::as_entity)
                .ok_or(LinealError::InvalidTree {
                    reason: "split_student requires a 'student' entity argument".to_string(),
                })?;
            let name = Entity::new("NameRecord")
                .with_field("name", student.field("name").cloned().unwrap_or(Value::Null));
            let score = Entity::new("ScoreRecord")
                .with_field("gpa", student.field("gpa").cloned().unwrap_or(Value::Null));
            Ok(CallableOutput::Entities(vec![name, score]))
        },
    )?;

    callables.register(
        "new_student",
        CallableSpec {
            input_shape: Shape::new(
                "NewStudentInput",
                vec![
                    ShapeField::new("name", FieldKind::Str),
                    ShapeField::new("gpa", FieldKind::Float),
                ],
            ),
            output_shape: OutputShape::Single(Shape::new(
                "Student",
                vec![
                    ShapeField::new("name", FieldKind::Str),
                    ShapeField::new("gpa", FieldKind::Float),
                ],
            )),
        },
        |input| {
            let name = input
                .field("name")
                .and_then(Value::as_str)
                .unwrap_or("unnamed")
                .to_string();
            let gpa = input.field("gpa").and_then(Value::as_float).unwrap_or(0.0);
            Ok(CallableOutput::Entity(
                Entity::new("Student")
                    .with_field("name", name)
                    .with_field("gpa", gpa),
            ))
        },
    )?;

    Ok(())
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from configuration.
///
/// - `["*"]`: allows all origins (development mode - use with caution!)
/// - `None`: defaults to localhost only (restrictive default)
/// - Otherwise: the configured list of allowed origins
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    match config.cors_origins.as_deref() {
        Some([single]) if single == "*" => {
            tracing::warn!(
                "CORS: Allowing ALL origins (cors_origins=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins configured, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::info!("CORS: No origins configured, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let localhost_origins = vec![
        "http://localhost:3000".parse::<HeaderValue>().ok(),
        "http://localhost:8080".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:3000".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:8080".parse::<HeaderValue>().ok(),
    ];
    let origins: Vec<HeaderValue> = localhost_origins.into_iter().flatten().collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. CORS - handles preflight requests
/// 2. Tracing - logs all requests
/// 3. Rate Limiting - protects against DoS (if enabled)
/// 4. Authentication - validates API key (if configured)
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    let cors = build_cors_layer(config);

    let rate_limiter = if config.rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", config.rate_limit);
        Some(create_rate_limiter(config.rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    if config.api_key.is_some() {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "⚠️  API key authentication DISABLED - all endpoints are publicly accessible! \
             Set api_key in the config file or LINEAL_API_KEY to enable authentication."
        );
    }

    // Build base router with routes
    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/functions", get(handlers::functions_handler))
        .route("/functions/{name}", get(handlers::function_handler))
        .route("/lineages", get(handlers::lineages_handler))
        .route("/lineages/{id}/history", get(handlers::history_handler))
        .route("/entities/{root_id}/{ecs_id}", get(handlers::entity_handler))
        .route("/resolve", get(handlers::resolve_handler))
        .route("/entities", post(handlers::register_handler))
        .route("/execute", post(handlers::execute_handler));

    // Apply authentication middleware (innermost - runs last on request)
    if let Some(key) = &config.api_key {
        router = router.layer(axum_middleware::from_fn_with_state(
            Arc::new(key.clone()),
            auth::api_key_auth_middleware,
        ));
    }

    // Apply rate limiting middleware
    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    // Apply CORS, body limit, and tracing (outermost layers)
    router
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(config: &ServerConfig, core: CoreState) -> Result<(), AppError> {
    let state = AppState::new(core);
    let router = create_router(state, config);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .map_err(|e| AppError::Io(format!("Bind failed: {e}")))?;

    tracing::info!("Lineal HTTP server listening on {}", config.bind);

    axum::serve(listener, router)
        .await
        .map_err(|e| AppError::Io(format!("Server error: {e}")))
}
