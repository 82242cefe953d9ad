//! Leadline sync client
//!
//! Client-side tracking of the long-running, server-executed data
//! synchronization jobs behind the Leadline app. The remote API runs the
//! job; this crate starts it, polls it on a fixed period, persists every
//! observed snapshot so tracking survives the process being killed
//! mid-job, and resumes a persisted job on the next launch without
//! restarting it.
//!
//! ## Module Structure
//!
//! - `config`: client configuration and env overrides
//! - `error`: transport error taxonomy
//! - `job`: job and sub-task records as reported by the server
//! - `transport`: remote start/poll/legacy operations over HTTP
//! - `store`: durable single-slot snapshot storage
//! - `progress`: pure aggregation of sub-task progress
//! - `monitor`: the state machine, poll loop, and resume logic

/// Client configuration
pub mod config;

/// Transport error taxonomy
pub mod error;

/// Job and sub-task records
pub mod job;

/// State machine, poller, and resume
pub mod monitor;

/// Progress aggregation
pub mod progress;

/// Durable snapshot storage
pub mod store;

/// Remote sync-job operations
pub mod transport;

pub use config::SyncConfig;
pub use error::TransportError;
pub use job::{AccountSyncTask, JobStatus, SyncJob, TaskStatus};
pub use monitor::{SyncMonitor, SyncPhase};
pub use progress::SyncProgress;
pub use store::{FileJobStore, JobStore, MemoryJobStore};
pub use transport::{HttpSyncTransport, PollOutcome, StartOutcome, SyncTransport};
