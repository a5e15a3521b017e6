//! Job records and their persistence.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteJobStore;
pub use store::{JobFilter, JobPage, JobStore, JobStoreError, JobUpdate};
pub use types::{Job, JobCost, JobError, JobProgress, JobStatus, UsageStats};
