use super::geohash;
use super::normalize::{normalize_handle, normalize_name, normalize_style};
use super::shard::bucket_for;
use super::types::{EntityKeySet, KeyDerivationError, KeyIssue};
use crate::discovery::types::CandidateEntity;

/// Builds the key set of an entity. Holds only the write-shard count, so it is
/// cheap to clone into every service that needs it.
#[derive(Debug, Clone, Copy)]
pub struct KeyDeriver {
    shard_count: u32,
}

impl KeyDeriver {
    pub fn new(shard_count: u32) -> Self {
        Self {
            shard_count: shard_count.max(1),
        }
    }

    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    /// Derives every key of `entity`.
    ///
    /// Absent optional attributes (no style, no handle) simply leave the matching
    /// secondary key unset. Attributes that are present but unusable produce
    /// [`KeyDerivationError::Partial`], which still carries the keys that could be
    /// built. Only a missing entity id is fatal.
    pub fn derive(&self, entity: &CandidateEntity) -> Result<EntityKeySet, KeyDerivationError> {
        let entity_id = entity.entity_id.trim();
        if entity_id.is_empty() {
            return Err(KeyDerivationError::MissingEntityId);
        }

        let mut keys = EntityKeySet::primary(entity_id);
        let mut issues = Vec::new();

        // GSI1: primary style + location, write-sharded
        if let Some(raw_style) = entity.styles.first() {
            let style = normalize_style(raw_style);
            let geohash = entity.geohash.as_deref().map(str::trim).filter(|g| !g.is_empty());

            match (style.is_empty(), geohash) {
                (true, _) => issues.push(KeyIssue::UnusableStyle(raw_style.clone())),
                (false, None) => issues.push(KeyIssue::MissingGeohash),
                (false, Some(hash)) if !geohash::is_valid(hash) => {
                    issues.push(KeyIssue::InvalidGeohash(hash.to_string()))
                }
                (false, Some(hash)) => {
                    let shard = bucket_for(entity_id, self.shard_count);
                    keys.gsi1pk = Some(format!("STYLE#{}#SHARD#{}", style, shard));
                    keys.gsi1sk = Some(format!(
                        "GEOHASH#{}#ENTITY#{}",
                        hash.to_ascii_lowercase(),
                        entity_id
                    ));
                }
            }
        }

        // GSI2: name lookup
        let name = normalize_name(&entity.name);
        if name.is_empty() {
            issues.push(KeyIssue::UnusableName(entity.name.clone()));
        } else {
            keys.gsi2pk = Some(format!("NAME#{}", name));
            keys.gsi2sk = Some(keys.pk.clone());
        }

        // GSI3: external identity
        if let Some(raw_handle) = entity.handle.as_deref().filter(|h| !h.trim().is_empty()) {
            let handle = normalize_handle(raw_handle);
            if handle.is_empty() {
                issues.push(KeyIssue::UnusableHandle(raw_handle.to_string()));
            } else {
                keys.gsi3pk = Some(format!("HANDLE#{}", handle));
            }
        }

        if issues.is_empty() {
            Ok(keys)
        } else {
            Err(KeyDerivationError::Partial { keys, issues })
        }
    }

    /// Like [`derive`](Self::derive) but folds a partial result into `Ok`,
    /// returning the issues alongside the keys. Still fails on a missing id.
    pub fn derive_flagged(
        &self,
        entity: &CandidateEntity,
    ) -> Result<(EntityKeySet, Vec<KeyIssue>), KeyDerivationError> {
        match self.derive(entity) {
            Ok(keys) => Ok((keys, Vec::new())),
            Err(KeyDerivationError::Partial { keys, issues }) => {
                tracing::warn!(
                    "Partial key set for {}: {}",
                    keys.pk,
                    issues
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                Ok((keys, issues))
            }
            Err(e) => Err(e),
        }
    }
}
