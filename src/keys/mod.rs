//! Single-Table Key Derivation
//!
//! Maps a candidate entity onto every key the single-table data model needs:
//! the primary key pair plus up to three secondary-index keys. Derivation is a
//! pure function of the entity's attributes, so the same entity always yields
//! byte-identical keys on every node and every run.
//!
//! ## Access patterns
//! - **GSI1**: style + location range queries, write-sharded by a stable hash of the id.
//! - **GSI2**: lookup by normalised display name.
//! - **GSI3**: dedup by external handle.
//!
//! ## Submodules
//! - **`deriver`**: the `KeyDeriver` itself.
//! - **`geohash`**: base32 geohash encode/decode used for GSI1 and geo-points.
//! - **`normalize`**: name, handle and style normalisation plus the style vocabulary.
//! - **`shard`**: seedless hashing shared with the storage partitioner.
//! - **`types`**: `EntityKeySet` and the derivation error/issue types.

pub mod deriver;
pub mod geohash;
pub mod normalize;
pub mod shard;
pub mod types;

pub use deriver::KeyDeriver;
pub use types::{EntityKeySet, KeyDerivationError, KeyIssue, METADATA_SK};

#[cfg(test)]
mod tests;
