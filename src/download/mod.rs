//! Concurrent bounded download manager.
//!
//! `manager` holds the coordinator shape (pending/active/cooling-down
//! collections, coarsest-first scheduling, idempotent enqueue); `worker`
//! holds the per-file fetch protocol (streamed digest verification,
//! content-length/digest assertions, validator invocation, atomic rename).

mod manager;
mod worker;

pub use manager::{DownloadManager, DownloadManagerConfig};
pub use worker::{fetch_file, WorkerConfig};
