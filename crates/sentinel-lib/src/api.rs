//! HTTP API for health checks, Prometheus metrics and the sample series

use crate::{
    connection::ConnectionControl,
    health::{ComponentStatus, HealthRegistry},
    models::{ConnectionState, DeviceTarget, Sample},
    observability::SentinelMetrics,
    series::{SeriesSnapshot, SeriesStore},
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: SentinelMetrics,
    pub store: SeriesStore,
    pub connection: ConnectionControl,
    pub target: DeviceTarget,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: SentinelMetrics,
        store: SeriesStore,
        connection: ConnectionControl,
        target: DeviceTarget,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            store,
            connection,
            target,
        }
    }
}

/// Body of `GET /api/v1/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub device: DeviceTarget,
    pub connection: ConnectionState,
    pub health: ComponentStatus,
    pub samples: usize,
    pub capacity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<Sample>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SeriesQuery {
    /// Only return the newest `limit` samples
    pub limit: Option<usize>,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still sampling
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let buffer = match state.metrics.encode_text() {
        Ok(buffer) => buffer,
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain; charset=utf-8")],
                e.to_string().into_bytes(),
            );
        }
    };

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let health = state.health_registry.health().await;

    Json(StatusResponse {
        device: state.target.clone(),
        connection: state.connection.state(),
        health: health.status,
        samples: state.store.len().await,
        capacity: state.store.capacity(),
        latest: state.store.latest().await,
    })
}

async fn latest(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.latest().await {
        Some(sample) => Json(sample).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: "no samples recorded yet".to_string(),
            }),
        )
            .into_response(),
    }
}

async fn series(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SeriesQuery>,
) -> Json<SeriesSnapshot> {
    Json(state.store.snapshot(query.limit).await)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/status", get(status))
        .route("/api/v1/latest", get(latest))
        .route("/api/v1/series", get(series))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
