//! Discovery Data Types
//!
//! `CandidateEntity` is the provisional record every later stage builds on;
//! `DiscoveryBatch` is the JSON document handed to the queueing stage.

use crate::error::ParamsError;
use crate::keys::{EntityKeySet, KeyIssue};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a candidate was first seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "google_maps", alias = "map_api")]
    MapApi,
    #[serde(rename = "directory_site")]
    DirectorySite,
    #[serde(rename = "instagram")]
    Instagram,
    #[serde(rename = "manual")]
    Manual,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::MapApi => "google_maps",
            Source::DirectorySite => "directory_site",
            Source::Instagram => "instagram",
            Source::Manual => "manual",
        }
    }
}

/// A provisionally discovered artist or studio. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEntity {
    pub entity_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub studio_name: Option<String>,
    pub source: Source,
    pub location: String,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geohash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub confidence: f64,
    #[serde(default = "Utc::now")]
    pub discovered_at: DateTime<Utc>,
}

/// Raw tuple returned by a candidate source before any normalisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCandidate {
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub source_ref: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub studio_name: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub geohash: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub review_count: Option<u32>,
}

/// What to discover.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryParams {
    pub locations: Vec<String>,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    100
}

impl DiscoveryParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.locations.iter().all(|l| l.trim().is_empty()) {
            return Err(ParamsError::NoLocations);
        }
        if self.max_results == 0 {
            return Err(ParamsError::ZeroMaxResults);
        }
        Ok(())
    }
}

/// One resolved candidate: the entity plus its (possibly partial) key set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredItem {
    #[serde(flatten)]
    pub entity: CandidateEntity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<EntityKeySet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_issues: Vec<KeyIssue>,
}

impl DiscoveredItem {
    pub fn has_partial_keys(&self) -> bool {
        !self.key_issues.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFailure {
    pub reference: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFailure {
    pub location: String,
    pub style: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverySummary {
    pub total_discovered: usize,
    pub by_location: BTreeMap<String, usize>,
    pub by_style: BTreeMap<String, usize>,
    pub partial_keys: usize,
    pub unknown_styles: usize,
    pub validation_failures: Vec<ValidationFailure>,
    pub source_failures: Vec<SourceFailure>,
    pub discovered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryBatch {
    pub discovered_items: Vec<DiscoveredItem>,
    pub summary: DiscoverySummary,
}
