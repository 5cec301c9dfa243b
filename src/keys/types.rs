use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sort key shared by every entity-level row.
pub const METADATA_SK: &str = "METADATA";
pub const ENTITY_PREFIX: &str = "ENTITY#";

/// All keys of one entity row. Serialises to the attribute names used on the
/// wire and in the store (`PK`, `SK`, `gsi1pk` ...).
///
/// Secondary keys are `None` when the attribute they index is absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKeySet {
    #[serde(rename = "PK")]
    pub pk: String,
    #[serde(rename = "SK")]
    pub sk: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gsi1pk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gsi1sk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gsi2pk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gsi2sk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gsi3pk: Option<String>,
}

impl EntityKeySet {
    /// Key set holding only the primary key pair.
    pub fn primary(entity_id: &str) -> Self {
        Self {
            pk: entity_pk(entity_id),
            sk: METADATA_SK.to_string(),
            gsi1pk: None,
            gsi1sk: None,
            gsi2pk: None,
            gsi2sk: None,
            gsi3pk: None,
        }
    }

    /// Number of secondary indexes this key set populates.
    pub fn secondary_count(&self) -> usize {
        [self.gsi1pk.is_some(), self.gsi2pk.is_some(), self.gsi3pk.is_some()]
            .iter()
            .filter(|present| **present)
            .count()
    }
}

pub fn entity_pk(entity_id: &str) -> String {
    format!("{}{}", ENTITY_PREFIX, entity_id)
}

/// Recovers the entity id from an `ENTITY#<id>` partition key.
pub fn entity_id_from_pk(pk: &str) -> Option<&str> {
    pk.strip_prefix(ENTITY_PREFIX).filter(|id| !id.is_empty())
}

/// Why a secondary key could not be built even though its source attribute was present.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(tag = "issue", content = "value", rename_all = "snake_case")]
pub enum KeyIssue {
    #[error("style present but geohash missing")]
    MissingGeohash,

    #[error("invalid geohash {0:?}")]
    InvalidGeohash(String),

    #[error("style {0:?} normalises to nothing")]
    UnusableStyle(String),

    #[error("name {0:?} normalises to nothing")]
    UnusableName(String),

    #[error("handle {0:?} normalises to nothing")]
    UnusableHandle(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum KeyDerivationError {
    /// No primary key can be built; the entity cannot be stored.
    #[error("entity id is missing")]
    MissingEntityId,

    /// Some secondary keys were dropped. `keys` still carries everything that
    /// could be derived.
    #[error("partial key set for {}: {} issue(s)", keys.pk, issues.len())]
    Partial {
        keys: EntityKeySet,
        issues: Vec<KeyIssue>,
    },
}
