use crate::config::PipelineConfig;
use crate::discovery::types::CandidateEntity;
use crate::keys::normalize::{normalize_location, normalize_style};

use std::collections::HashSet;

const BASE: i32 = 5;
const HANDLE_BONUS: i32 = 2;
const POPULAR_STYLE_BONUS: i32 = 1;
const PRIORITY_LOCATION_BONUS: i32 = 1;
const HIGH_CONFIDENCE_BONUS: i32 = 1;
const HIGH_CONFIDENCE: f64 = 0.90;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

/// Additive priority: base 5, +2 handle, +1 popular style, +1 priority location,
/// +1 confidence above 0.90, clamped to `[1, 10]`.
#[derive(Debug, Clone, Default)]
pub struct PriorityRules {
    popular_styles: HashSet<String>,
    priority_locations: HashSet<String>,
}

impl PriorityRules {
    pub fn new<S, L>(popular_styles: S, priority_locations: L) -> Self
    where
        S: IntoIterator,
        S::Item: AsRef<str>,
        L: IntoIterator,
        L::Item: AsRef<str>,
    {
        Self {
            popular_styles: popular_styles
                .into_iter()
                .map(|s| normalize_style(s.as_ref()))
                .collect(),
            priority_locations: priority_locations
                .into_iter()
                .map(|l| normalize_location(l.as_ref()))
                .collect(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.popular_styles, &config.priority_locations)
    }

    pub fn score(&self, entity: &CandidateEntity) -> u8 {
        let mut score = BASE;

        if entity.handle.as_deref().is_some_and(|h| !h.trim().is_empty()) {
            score += HANDLE_BONUS;
        }
        if entity
            .styles
            .iter()
            .any(|style| self.popular_styles.contains(&normalize_style(style)))
        {
            score += POPULAR_STYLE_BONUS;
        }
        if self
            .priority_locations
            .contains(&normalize_location(&entity.location))
        {
            score += PRIORITY_LOCATION_BONUS;
        }
        if entity.confidence > HIGH_CONFIDENCE {
            score += HIGH_CONFIDENCE_BONUS;
        }

        score.clamp(i32::from(MIN_PRIORITY), i32::from(MAX_PRIORITY)) as u8
    }
}
