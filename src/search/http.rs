use super::SearchIndex;
use super::types::{DeleteOutcome, SearchDocument};
use crate::error::IndexError;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

/// OpenSearch-compatible document API client: `PUT|GET|DELETE /{index}/_doc/{id}`.
///
/// Connection errors, 429 and 5xx responses are retried a few times with
/// jittered backoff before surfacing as `IndexError::Unavailable`. Any other
/// non-success status is `IndexError::Rejected`.
pub struct HttpSearchIndex {
    client: reqwest::Client,
    base_url: Url,
    index: String,
    timeout: Duration,
    attempts: usize,
}

#[derive(Deserialize)]
struct GetResponse {
    #[serde(rename = "_source")]
    source: Option<SearchDocument>,
}

impl HttpSearchIndex {
    pub fn new(base_url: &str, index: &str, timeout: Duration) -> Result<Self, IndexError> {
        let base_url = Url::parse(base_url).map_err(|e| IndexError::Rejected {
            status: 0,
            body: format!("invalid search endpoint {:?}: {}", base_url, e),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(IndexError::Rejected {
                status: 0,
                body: format!("search endpoint {} cannot be a base url", base_url),
            });
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            index: index.to_string(),
            timeout,
            attempts: 3,
        })
    }

    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    fn doc_url(&self, id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([self.index.as_str(), "_doc", id]);
        }
        url
    }

    async fn send_with_retry<F>(&self, build: F) -> Result<Response, IndexError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut delay_ms = 150u64;

        for attempt in 0..self.attempts {
            let last_attempt = attempt + 1 == self.attempts;
            match build().timeout(self.timeout).send().await {
                Ok(response) if is_retryable(response.status()) && !last_attempt => {
                    tracing::debug!(
                        "Search index returned {}, retrying (attempt {})",
                        response.status(),
                        attempt + 1
                    );
                }
                Ok(response) => return Ok(response),
                Err(e) if last_attempt => {
                    return Err(if e.is_timeout() {
                        IndexError::Timeout
                    } else {
                        IndexError::Unavailable(e.to_string())
                    });
                }
                Err(e) => {
                    tracing::debug!("Search index call failed, retrying: {}", e);
                }
            }

            let jitter = rand::random::<u64>() % 50;
            tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
            delay_ms = (delay_ms * 2).min(1200);
        }

        Err(IndexError::Unavailable("retry attempts exhausted".to_string()))
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

async fn status_error(response: Response) -> IndexError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if is_retryable(status) {
        IndexError::Unavailable(format!("{}: {}", status, body))
    } else {
        IndexError::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}

#[async_trait]
impl SearchIndex for HttpSearchIndex {
    async fn upsert(&self, document: SearchDocument) -> Result<(), IndexError> {
        let url = self.doc_url(&document.id);
        let response = self
            .send_with_retry(|| self.client.put(url.clone()).json(&document))
            .await?;

        if response.status().is_success() {
            tracing::debug!("Upserted {} into {}", document.id, self.index);
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }

    async fn delete(&self, id: &str) -> Result<DeleteOutcome, IndexError> {
        let url = self.doc_url(id);
        let response = self
            .send_with_retry(|| self.client.delete(url.clone()))
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(DeleteOutcome::NotFound),
            status if status.is_success() => Ok(DeleteOutcome::Deleted),
            _ => Err(status_error(response).await),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<SearchDocument>, IndexError> {
        let url = self.doc_url(id);
        let response = self.send_with_retry(|| self.client.get(url.clone())).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: GetResponse =
                    response.json().await.map_err(|e| IndexError::Rejected {
                        status: status.as_u16(),
                        body: format!("unreadable document: {}", e),
                    })?;
                Ok(body.source)
            }
            _ => Err(status_error(response).await),
        }
    }
}
