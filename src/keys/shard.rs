//! Seedless hashing.
//!
//! `std`'s `DefaultHasher` is randomly keyed per process, which would make write
//! shards differ between workers. `FxHasher` has no seed.

use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

pub fn stable_hash(key: &str) -> u64 {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

/// `hash(key) mod buckets`. A bucket count of zero is treated as one.
pub fn bucket_for(key: &str, buckets: u32) -> u32 {
    (stable_hash(key) % u64::from(buckets.max(1))) as u32
}
