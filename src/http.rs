//! HTTP surface of the lookup service.
//!
//! | Route | Response |
//! |---|---|
//! | `GET /buscar?identidad=<raw>` | `200` record JSON, `200 null` on no match, `400` invalid identity, `500`/`503` dataset unavailable |
//! | `GET /health` | `200` materialization status and build attempts |
//!
//! Error bodies are `{"error": "<message>"}`.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::warn;
use crate::error::{LookupError, MaterializeError};
use crate::lookup::LookupService;
use crate::materialize::MaterializationStatus;

const INVALID_IDENTITY_MESSAGE: &str = "Parámetro \"identidad\" inválido";

#[derive(Debug, Deserialize)]
struct FindQuery {
    identidad: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthReport {
    #[serde(flatten)]
    status: MaterializationStatus,
    build_attempts: u64,
}

pub fn router(service: LookupService) -> Router {
    Router::new()
        .route("/buscar", get(find_identity))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

async fn find_identity(
    State(service): State<LookupService>,
    Query(query): Query<FindQuery>,
) -> Response {
    let raw = query.identidad.unwrap_or_default();
    match service.find(&raw).await {
        Ok(record) => Json(record).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn health(State(service): State<LookupService>) -> Json<HealthReport> {
    let coordinator = service.coordinator();
    Json(HealthReport {
        status: coordinator.status(),
        build_attempts: coordinator.build_attempts(),
    })
}

impl IntoResponse for LookupError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            LookupError::Validation(_) => (StatusCode::BAD_REQUEST, INVALID_IDENTITY_MESSAGE.to_string()),
            LookupError::Unavailable(MaterializeError::Timeout(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            LookupError::Unavailable(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %message, "lookup failed");
        }
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
