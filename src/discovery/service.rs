use super::source::CandidateSource;
use super::types::*;
use crate::keys::geohash::{self, DEFAULT_PRECISION};
use crate::keys::normalize::{is_known_style, normalize_location, normalize_name, normalize_style};
use crate::keys::{KeyDerivationError, KeyDeriver};
use crate::telemetry::{Metric, PipelineMetrics};

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

const CONFIDENCE_FLOOR: f64 = 0.70;
const CONFIDENCE_SPAN: f64 = 0.30;
const CONFIDENCE_SIGNALS: f64 = 5.0;

pub struct DiscoveryService {
    source: Arc<dyn CandidateSource>,
    deriver: KeyDeriver,
    metrics: Arc<PipelineMetrics>,
    fetch_timeout: Duration,
}

impl DiscoveryService {
    pub fn new(
        source: Arc<dyn CandidateSource>,
        deriver: KeyDeriver,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            source,
            deriver,
            metrics,
            fetch_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Runs every (location × style) query and resolves the results into a batch.
    ///
    /// Never fails as a whole: source errors and invalid records are reported in
    /// the summary and the remaining work continues.
    pub async fn discover(&self, params: &DiscoveryParams) -> DiscoveryBatch {
        let discovered_at = Utc::now();
        let locations = dedup(params.locations.iter().map(|l| normalize_location(l)));
        let styles: Vec<Option<String>> = if params.styles.is_empty() {
            vec![None]
        } else {
            dedup(params.styles.iter().map(|s| normalize_style(s)))
                .into_iter()
                .map(Some)
                .collect()
        };

        let mut items: Vec<DiscoveredItem> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut validation_failures = Vec::new();
        let mut source_failures = Vec::new();

        'queries: for location in &locations {
            for style in &styles {
                let remaining = params.max_results.saturating_sub(items.len());
                if remaining == 0 {
                    tracing::info!("Discovery reached max_results={}", params.max_results);
                    break 'queries;
                }

                let fetched = tokio::time::timeout(
                    self.fetch_timeout,
                    self.source.fetch(location, style.as_deref(), remaining),
                )
                .await;

                let raws = match fetched {
                    Ok(Ok(raws)) => raws,
                    Ok(Err(e)) => {
                        tracing::warn!("Source query {}/{:?} failed: {}", location, style, e);
                        source_failures.push(SourceFailure {
                            location: location.clone(),
                            style: style.clone(),
                            error: e.to_string(),
                        });
                        continue;
                    }
                    Err(_) => {
                        tracing::warn!("Source query {}/{:?} timed out", location, style);
                        source_failures.push(SourceFailure {
                            location: location.clone(),
                            style: style.clone(),
                            error: "timed out".to_string(),
                        });
                        continue;
                    }
                };

                tracing::debug!("Source returned {} candidates for {}/{:?}", raws.len(), location, style);

                for raw in raws {
                    if items.len() >= params.max_results {
                        break;
                    }
                    match self.resolve(raw, location, discovered_at) {
                        Ok(item) => match positions.get(&item.entity.entity_id) {
                            Some(&pos) => self.merge_styles(&mut items[pos], &item.entity.styles),
                            None => {
                                positions.insert(item.entity.entity_id.clone(), items.len());
                                items.push(item);
                            }
                        },
                        Err(failure) => {
                            tracing::warn!(
                                "Rejected candidate {}: {}",
                                failure.reference,
                                failure.reason
                            );
                            validation_failures.push(failure);
                        }
                    }
                }
            }
        }

        self.metrics.add(Metric::Discovered, items.len() as u64);
        self.metrics
            .add(Metric::DiscoveryRejected, validation_failures.len() as u64);

        let summary = summarize(&items, validation_failures, source_failures, discovered_at);
        tracing::info!(
            "Discovery finished: {} items, {} partial keys, {} rejected, {} source failures",
            summary.total_discovered,
            summary.partial_keys,
            summary.validation_failures.len(),
            summary.source_failures.len()
        );

        DiscoveryBatch {
            discovered_items: items,
            summary,
        }
    }

    /// Turns a raw tuple into a keyed candidate, or explains why it was rejected.
    pub fn resolve(
        &self,
        raw: RawCandidate,
        location: &str,
        discovered_at: DateTime<Utc>,
    ) -> Result<DiscoveredItem, ValidationFailure> {
        let source = self.source.source();
        let entity_id = raw
            .entity_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                let reference = normalize_name(&raw.source_ref);
                if reference.is_empty() {
                    String::new()
                } else {
                    format!("{}-{}", source.as_str(), reference)
                }
            });

        let reference = if entity_id.is_empty() {
            format!("{}:{}", source.as_str(), raw.name.trim())
        } else {
            entity_id.clone()
        };

        let name = raw.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationFailure {
                reference,
                reason: "missing name".to_string(),
            });
        }

        let confidence = confidence_for(&raw);
        let styles = dedup(raw.styles.iter().map(|s| normalize_style(s)));
        let geohash = raw
            .geohash
            .as_deref()
            .map(|g| g.trim().to_ascii_lowercase())
            .filter(|g| !g.is_empty())
            .or_else(|| match (raw.latitude, raw.longitude) {
                (Some(lat), Some(lon)) => geohash::encode(lat, lon, DEFAULT_PRECISION),
                _ => None,
            });

        let entity = CandidateEntity {
            entity_id,
            name,
            studio_name: raw.studio_name.filter(|s| !s.trim().is_empty()),
            source,
            location: location.to_string(),
            styles,
            geohash,
            latitude: raw.latitude,
            longitude: raw.longitude,
            handle: raw.handle.filter(|h| !h.trim().is_empty()),
            confidence,
            discovered_at,
        };

        match self.deriver.derive_flagged(&entity) {
            Ok((keys, key_issues)) => Ok(DiscoveredItem {
                entity,
                keys: Some(keys),
                key_issues,
            }),
            Err(KeyDerivationError::MissingEntityId) => Err(ValidationFailure {
                reference,
                reason: "missing entity id and source reference".to_string(),
            }),
            Err(e) => Err(ValidationFailure {
                reference,
                reason: e.to_string(),
            }),
        }
    }
}

impl DiscoveryService {
    /// Unions `styles` into an already emitted item. Keys are derived from the
    /// style list, so they are rebuilt whenever it grows.
    fn merge_styles(&self, item: &mut DiscoveredItem, styles: &[String]) {
        let before = item.entity.styles.len();
        for style in styles {
            if !item.entity.styles.contains(style) {
                item.entity.styles.push(style.clone());
            }
        }
        if item.entity.styles.len() == before {
            return;
        }

        match self.deriver.derive_flagged(&item.entity) {
            Ok((keys, key_issues)) => {
                item.keys = Some(keys);
                item.key_issues = key_issues;
            }
            Err(e) => {
                tracing::warn!(
                    "Could not re-derive keys for {}: {}",
                    item.entity.entity_id,
                    e
                );
            }
        }
    }
}

/// Confidence rises with the number of optional signals present:
/// handle, styles, coordinates, website, reviews.
pub fn confidence_for(raw: &RawCandidate) -> f64 {
    let signals = [
        raw.handle.as_deref().is_some_and(|h| !h.trim().is_empty()),
        raw.styles.iter().any(|s| !s.trim().is_empty()),
        raw.geohash.as_deref().is_some_and(|g| !g.trim().is_empty())
            || (raw.latitude.is_some() && raw.longitude.is_some()),
        raw.website.as_deref().is_some_and(|w| !w.trim().is_empty()),
        raw.review_count.is_some_and(|c| c > 0),
    ];
    let present = signals.iter().filter(|s| **s).count() as f64;
    let score = CONFIDENCE_FLOOR + CONFIDENCE_SPAN * (present / CONFIDENCE_SIGNALS);
    ((score * 100.0).round() / 100.0).clamp(CONFIDENCE_FLOOR, 1.0)
}


fn dedup(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

fn summarize(
    items: &[DiscoveredItem],
    validation_failures: Vec<ValidationFailure>,
    source_failures: Vec<SourceFailure>,
    discovered_at: DateTime<Utc>,
) -> DiscoverySummary {
    let mut by_location = BTreeMap::new();
    let mut by_style = BTreeMap::new();
    let mut unknown_styles = 0;

    for item in items {
        *by_location.entry(item.entity.location.clone()).or_insert(0) += 1;
        for style in &item.entity.styles {
            *by_style.entry(style.clone()).or_insert(0) += 1;
            if !is_known_style(style) {
                unknown_styles += 1;
            }
        }
    }

    DiscoverySummary {
        total_discovered: items.len(),
        by_location,
        by_style,
        partial_keys: items.iter().filter(|i| i.has_partial_keys()).count(),
        unknown_styles,
        validation_failures,
        source_failures,
        discovered_at,
    }
}
