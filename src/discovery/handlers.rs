use super::service::DiscoveryService;
use super::types::{DiscoveryBatch, DiscoveryParams};
use crate::telemetry::correlation_id;

use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::Instrument;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub async fn handle_discover(
    Extension(service): Extension<Arc<DiscoveryService>>,
    headers: HeaderMap,
    Json(params): Json<DiscoveryParams>,
) -> Result<Json<DiscoveryBatch>, (StatusCode, Json<ErrorResponse>)> {
    if let Err(error) = params.validate() {
        tracing::warn!("Rejected discovery request: {}", error);
        return Err((StatusCode::BAD_REQUEST, Json(ErrorResponse {
            error: error.to_string(),
        })));
    }

    let span = tracing::info_span!("discover", correlation_id = %correlation_id(&headers));
    let batch = service.discover(&params).instrument(span).await;

    Ok(Json(batch))
}
