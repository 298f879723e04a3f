//! Per-kind reconciliation loops.
//!
//! A [`Collector`] keeps the store's records of one entity kind in step with
//! the resource manager: it inserts records for new identities, patches
//! records whose fields changed, and leaves everything else alone.

mod engine;
mod handle;
mod types;

pub use engine::{Collector, DEFAULT_INTERVAL};
pub use handle::CollectorHandle;
pub use types::{CollectorError, CollectorState, CycleReport};
