//! Candidate Sources
//!
//! Discovery never talks to a map API or directory site directly; it asks a
//! `CandidateSource`. Production adapters implement the trait around real HTTP
//! clients. `FixtureCandidateSource` serves canned tuples and, when configured
//! to, synthesises deterministic ones for locations it has no fixtures for.

use super::types::{RawCandidate, Source};
use crate::error::SourceError;
use crate::keys::shard::stable_hash;

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Which provenance tag candidates from this source carry.
    fn source(&self) -> Source;

    /// Returns at most `limit` raw candidates for `location`, optionally filtered by style.
    async fn fetch(
        &self,
        location: &str,
        style: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RawCandidate>, SourceError>;
}

const KNOWN_CITIES: [(&str, f64, f64); 6] = [
    ("london", 51.5074, -0.1278),
    ("manchester", 53.4808, -2.2426),
    ("birmingham", 52.4862, -1.8904),
    ("leeds", 53.8008, -1.5491),
    ("glasgow", 55.8642, -4.2518),
    ("bristol", 51.4545, -2.5879),
];

const NAME_LEFT: [&str; 8] = [
    "Black", "Iron", "Golden", "Crimson", "Silver", "Lucky", "Electric", "Velvet",
];
const NAME_RIGHT: [&str; 8] = [
    "Anchor", "Rose", "Needle", "Dagger", "Swallow", "Lantern", "Serpent", "Crown",
];

pub struct FixtureCandidateSource {
    source: Source,
    fixtures: DashMap<(String, Option<String>), Vec<RawCandidate>>,
    failures: DashMap<(String, Option<String>), SourceError>,
    synthetic_per_query: usize,
    calls: AtomicUsize,
}

impl FixtureCandidateSource {
    /// Source that only serves explicitly registered fixtures.
    pub fn new(source: Source) -> Self {
        Self {
            source,
            fixtures: DashMap::new(),
            failures: DashMap::new(),
            synthetic_per_query: 0,
            calls: AtomicUsize::new(0),
        }
    }

    /// Source that synthesises `per_query` candidates for any query without fixtures.
    pub fn synthetic(source: Source, per_query: usize) -> Self {
        Self {
            synthetic_per_query: per_query,
            ..Self::new(source)
        }
    }

    pub fn insert(&self, location: &str, style: Option<&str>, candidates: Vec<RawCandidate>) {
        self.fixtures.insert(query_key(location, style), candidates);
    }

    /// Makes every fetch for this query fail with `error`.
    pub fn fail(&self, location: &str, style: Option<&str>, error: SourceError) {
        self.failures.insert(query_key(location, style), error);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn synthesize(&self, location: &str, style: Option<&str>, count: usize) -> Vec<RawCandidate> {
        let seed = stable_hash(&format!("{}|{}", location, style.unwrap_or("*"))) as usize;
        let coords = KNOWN_CITIES
            .iter()
            .find(|(city, _, _)| *city == location)
            .map(|(_, lat, lon)| (*lat, *lon));

        (0..count)
            .map(|i| {
                let left = NAME_LEFT[(seed + i) % NAME_LEFT.len()];
                let right = NAME_RIGHT[(seed / 7 + i * 3) % NAME_RIGHT.len()];
                let offset = i as f64 * 0.003;
                RawCandidate {
                    entity_id: None,
                    source_ref: format!("{}-{}-{}", location, style.unwrap_or("any"), i),
                    name: format!("{} {} Tattoo", left, right),
                    studio_name: (i % 2 == 0).then(|| format!("{} {} Studio", left, right)),
                    handle: (i % 3 != 2)
                        .then(|| format!("@{}{}ink", left.to_lowercase(), right.to_lowercase())),
                    styles: style.map(|s| vec![s.to_string()]).unwrap_or_default(),
                    latitude: coords.map(|(lat, _)| lat + offset),
                    longitude: coords.map(|(_, lon)| lon - offset),
                    geohash: None,
                    website: (i % 3 == 0)
                        .then(|| format!("https://{}{}.example", left, right).to_lowercase()),
                    review_count: (i % 2 == 0).then_some(((seed + i) % 200) as u32 + 1),
                }
            })
            .collect()
    }
}

#[async_trait]
impl CandidateSource for FixtureCandidateSource {
    fn source(&self) -> Source {
        self.source
    }

    async fn fetch(
        &self,
        location: &str,
        style: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RawCandidate>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = query_key(location, style);

        if let Some(error) = self.failures.get(&key) {
            return Err(error.clone());
        }

        if let Some(candidates) = self.fixtures.get(&key) {
            return Ok(candidates.iter().take(limit).cloned().collect());
        }

        Ok(self.synthesize(location, style, self.synthetic_per_query.min(limit)))
    }
}

fn query_key(location: &str, style: Option<&str>) -> (String, Option<String>) {
    (location.to_string(), style.map(str::to_string))
}
