//! Sync orchestration
//!
//! # Components
//!
//! - [`retry`]: fixed-delay, bounded-attempt retry policy
//! - [`replicator`]: the sync run itself, primary to replicas
//! - [`schedule`]: cron-driven recurring runs
//!
//! # Example
//!
//! ```ignore
//! use replica_sync::models::SyncPolicy;
//! use replica_sync::sync::Replicator;
//!
//! let replicator = Replicator::from_config(&config, http);
//! let report = replicator.run(&SyncPolicy::full(true)).await?;
//! ```

pub mod replicator;
pub mod retry;
pub mod schedule;

// Re-export main types for convenience
pub use replicator::{build_partial, Replicator, SyncReport};
pub use retry::RetryPolicy;
pub use schedule::{ScheduleRunner, SyncSchedule, Syncable};
