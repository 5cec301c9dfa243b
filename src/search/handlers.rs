use super::memory::MemorySearchIndex;
use super::types::{SearchHit, SearchResponse};
use axum::extract::Query;
use axum::{Extension, Json};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub style: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn handle_search(
    Query(params): Query<SearchParams>,
    Extension(index): Extension<Arc<MemorySearchIndex>>,
) -> Json<SearchResponse> {
    let results = index.query(&params.q, params.style.as_deref(), usize::MAX);
    let limit = params.limit.unwrap_or(10);
    let offset = params.offset.unwrap_or(0);
    let total_count = results.len();
    let results: Vec<SearchHit> = results.into_iter().skip(offset).take(limit).collect();

    tracing::debug!("Search {:?} matched {} documents", params.q, total_count);

    Json(SearchResponse {
        query: params.q,
        style: params.style,
        total_count,
        count: results.len(),
        results,
    })
}
