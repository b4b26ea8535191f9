//! HTTP surface of the daemon
//!
//! Liveness, Prometheus metrics, a status view of every checkable and an
//! endpoint accepting external command lines.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use watchkeeper_core::engine::{CommandReport, EngineHandle, EngineSnapshot};
use watchkeeper_core::telemetry::EngineMetrics;
use watchkeeper_core::EngineError;

/// Application state
pub struct AppState {
    pub engine: EngineHandle,
    pub metrics: EngineMetrics,
}

impl AppState {
    pub fn new(engine: EngineHandle, metrics: EngineMetrics) -> Self {
        Self { engine, metrics }
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/api/v1/checkables", get(list_checkables))
        .route("/api/v1/commands", post(submit_command))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: watchkeeper_core::VERSION.to_string(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiFailure> {
    let body = state.metrics.encode().map_err(|e| {
        ApiFailure::new(StatusCode::INTERNAL_SERVER_ERROR, "MetricsUnavailable", e.to_string())
    })?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

/// Status of every host and service
async fn list_checkables(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<EngineSnapshot>>, ApiFailure> {
    let snapshot = state.engine.snapshot().await?;
    Ok(Json(ApiResponse {
        success: true,
        data: snapshot,
    }))
}

/// Execute one `[timestamp] VERB;args` line
async fn submit_command(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CommandRequest>,
) -> Result<Json<ApiResponse<CommandReport>>, ApiFailure> {
    if request.line.trim().is_empty() {
        return Err(ApiFailure::new(
            StatusCode::BAD_REQUEST,
            "InvalidInput",
            "Command line must not be empty",
        ));
    }

    let report = state.engine.command(request.line).await?;
    tracing::info!(verb = %report.verb, effects = report.effects, "Command accepted over HTTP");
    Ok(Json(ApiResponse {
        success: true,
        data: report,
    }))
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Command request
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub line: String,
}

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

/// API error
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}

/// Error response with its status code
#[derive(Debug)]
pub struct ApiFailure {
    status: StatusCode,
    body: ApiError,
}

impl ApiFailure {
    fn new(status: StatusCode, error: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiError {
                error: error.to_string(),
                message: message.into(),
            },
        }
    }
}

impl From<EngineError> for ApiFailure {
    fn from(err: EngineError) -> Self {
        match &err {
            EngineError::Command(_) => {
                ApiFailure::new(StatusCode::BAD_REQUEST, "CommandRejected", err.to_string())
            }
            EngineError::Stopped(_) => {
                ApiFailure::new(StatusCode::SERVICE_UNAVAILABLE, "EngineStopped", err.to_string())
            }
            _ => ApiFailure::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", err.to_string()),
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;
    use watchkeeper_core::clock::ManualClock;
    use watchkeeper_core::config::EngineConfig;
    use watchkeeper_core::contracts::CheckRequest;
    use watchkeeper_core::delegate::{DelegateError, ExecutionDelegate};
    use watchkeeper_core::engine::{Engine, EngineContext, NotificationJob};
    use watchkeeper_core::model::{Host, Service};
    use watchkeeper_core::Registry;

    struct IdleDelegate;

    impl ExecutionDelegate for IdleDelegate {
        fn submit(&self, _request: CheckRequest) -> Result<(), DelegateError> {
            Ok(())
        }

        fn deliver(&self, _job: NotificationJob) -> Result<(), DelegateError> {
            Ok(())
        }
    }

    fn router() -> Router {
        let mut registry = Registry::new();
        registry.add_host(Host::new("web01", "10.0.0.1")).unwrap();
        registry.add_service(Service::new("web01", "http")).unwrap();

        let metrics = EngineMetrics::new().unwrap();
        let config = EngineConfig::builder().max_jitter(0).build();
        let context = EngineContext::with_metrics(config, registry, metrics.clone()).unwrap();
        let (engine, handle) = Engine::new(context, Arc::new(ManualClock::new(1_000)));
        tokio::spawn(engine.run(Arc::new(IdleDelegate)));

        create_router(Arc::new(AppState::new(handle, metrics)))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_command(line: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/commands")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::json!({ "line": line }).to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_command_then_snapshot() {
        let app = router();
        let response = app
            .clone()
            .oneshot(post_command("[1000] DISABLE_SVC_CHECK;web01;http"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["verb"], "DISABLE_SVC_CHECK");

        let response = app
            .oneshot(Request::builder().uri("/api/v1/checkables").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["data"]["services"], 1);
        let service = body["data"]["checkables"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["display_name"] == "http")
            .unwrap()
            .clone();
        assert_eq!(service["checks_enabled"], false);
    }

    #[tokio::test]
    async fn test_rejected_command() {
        let app = router();
        let response = app
            .clone()
            .oneshot(post_command("[1000] DISABLE_SVC_CHECK;web01;ftp"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "CommandRejected");

        let response = app.oneshot(post_command("  ")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let app = router();
        app.clone()
            .oneshot(post_command("[1000] DISABLE_NOTIFICATIONS"))
            .await
            .unwrap();

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("watchkeeper_commands_total"));
    }
}
