//! Scrape Worker Pool
//!
//! Independent workers that long-poll the job queue, run the detail scrape and
//! commit the result to the primary store.
//!
//! ## Responsibilities
//! - **Polling**: each worker runs its own receive loop; workers share nothing but
//!   the queue and the store.
//! - **Idempotent commit**: the store write is conditioned on the stored scrape-run
//!   id differing from the job's, so redelivering a job is a no-op
//!   (`SkippedDuplicate`) rather than a second state transition.
//! - **Acknowledgement**: committed and duplicate jobs are deleted; transient
//!   failures release the lease for redelivery; permanent ones are dead-lettered.
//!
//! ## Submodules
//! - **`pool`**: `ScrapeWorkerPool`, the worker loop and per-job processing.
//! - **`scraper`**: the `DetailScraper` collaborator and its stub.
//! - **`types`**: outcomes, scrape results and settings.

pub mod pool;
pub mod scraper;
pub mod types;

pub use pool::ScrapeWorkerPool;
pub use scraper::{DetailScraper, StubDetailScraper};
pub use types::{ScrapeDetails, ScrapeOutcome, WorkerSettings};

#[cfg(test)]
mod tests;
