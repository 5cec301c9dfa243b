//! Discovery Service Module
//!
//! Produces candidate artist/studio entities from external sources and prepares
//! them for queueing.
//!
//! ## Workflow
//! 1. **Fetch**: For each (location × style) pair, asks the injected `CandidateSource`
//!    for raw candidate tuples.
//! 2. **Resolve**: Normalises attributes, scores confidence from data completeness and
//!    derives the single-table key set.
//! 3. **Summarise**: Emits the ordered item list with per-location/per-style counts,
//!    validation rejects and source failures.
//!
//! One bad record or one failing source query never aborts the batch.

pub mod handlers;
pub mod service;
pub mod source;
pub mod types;

pub use service::DiscoveryService;
pub use source::{CandidateSource, FixtureCandidateSource};
