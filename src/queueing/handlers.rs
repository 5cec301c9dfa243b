use super::service::QueueingService;
use super::types::{EnqueueRequest, EnqueueResult};
use crate::discovery::handlers::ErrorResponse;
use crate::discovery::service::DiscoveryService;
use crate::discovery::types::{DiscoveryParams, DiscoverySummary};
use crate::telemetry::correlation_id;

use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::Instrument;

/// Partial failures are reported in the body; the status is always 200.
pub async fn handle_enqueue(
    Extension(service): Extension<Arc<QueueingService>>,
    headers: HeaderMap,
    Json(request): Json<EnqueueRequest>,
) -> Json<EnqueueResult> {
    let span = tracing::info_span!("enqueue", correlation_id = %correlation_id(&headers));
    let result = service
        .enqueue(request.discovered_items)
        .instrument(span)
        .await;
    Json(result)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverAndEnqueueResponse {
    pub discovery: DiscoverySummary,
    pub enqueue: EnqueueResult,
}

pub async fn handle_discover_and_enqueue(
    Extension(discovery): Extension<Arc<DiscoveryService>>,
    Extension(queueing): Extension<Arc<QueueingService>>,
    headers: HeaderMap,
    Json(params): Json<DiscoveryParams>,
) -> Result<Json<DiscoverAndEnqueueResponse>, (StatusCode, Json<ErrorResponse>)> {
    if let Err(error) = params.validate() {
        tracing::warn!("Rejected discover-and-enqueue request: {}", error);
        return Err((StatusCode::BAD_REQUEST, Json(ErrorResponse {
            error: error.to_string(),
        })));
    }

    let span = tracing::info_span!(
        "discover_and_enqueue",
        correlation_id = %correlation_id(&headers)
    );
    let response = async {
        let batch = discovery.discover(&params).await;
        let enqueue = queueing.enqueue(batch.discovered_items).await;
        DiscoverAndEnqueueResponse {
            discovery: batch.summary,
            enqueue,
        }
    }
    .instrument(span)
    .await;

    Ok(Json(response))
}
