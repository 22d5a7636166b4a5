//! Deduplicating job admission, background execution, and status tracking.
//!
//! Callers derive a [`Fingerprint`] for their request and call [`JobRegistry::admit`]. A
//! fingerprint that is still tracked yields the existing [`CorrelationId`]; otherwise a fresh
//! id is registered and the work is handed to the [`JobRunner`]. Anyone holding the id can
//! poll [`JobRegistry::query_status`] until the job is done or its entries are evicted.

pub mod registry;
pub mod runner;
pub mod types;

pub use registry::JobRegistry;
pub use runner::JobRunner;
pub use types::{Admission, CorrelationId, Fingerprint, JobStatus, Outcome};
