//! Reconcilers for MySQL backup CRDs
//!
//! This module contains the business logic for reconciling each CRD type.
//! Reconcilers are responsible for:
//! - Validating CRD specs
//! - Driving the phase state machines and executing operations
//! - Updating resource status and provenance labels

pub mod backup;
pub mod restore;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::OperatorConfig;
use crate::executor::OperationExecutor;
use crate::scheduler::AgentScheduler;
use crate::store::OperationStore;

/// Requeue interval while an operation is progressing
pub const REQUEUE_IN_PROGRESS: Duration = Duration::from_secs(5);

/// Requeue interval while a restore waits for its source backup
pub const REQUEUE_WAITING: Duration = Duration::from_secs(10);

/// Everything a reconcile pass needs besides the resource itself
pub struct OperationContext {
    /// Where resources are read and patched
    pub store: Arc<dyn OperationStore>,
    /// Picks the member that executes an operation
    pub scheduler: AgentScheduler,
    /// Runs the backup and restore work
    pub executor: Arc<dyn OperationExecutor>,
    pub config: OperatorConfig,
}

/// Whether an operation observed Running at reconcile start has outlived the
/// execution timeout and can no longer be in flight
pub fn is_interrupted(
    start_time: Option<DateTime<Utc>>,
    timeout: Duration,
    now: DateTime<Utc>,
) -> bool {
    match start_time {
        None => true,
        Some(start) => (now - start)
            .to_std()
            .map(|elapsed| elapsed >= timeout)
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_without_start_time_is_interrupted() {
        assert!(is_interrupted(None, Duration::from_secs(60), Utc::now()));
    }

    #[test]
    fn running_within_timeout_is_not_interrupted() {
        let now = Utc::now();
        let start = now - chrono::Duration::seconds(30);
        assert!(!is_interrupted(Some(start), Duration::from_secs(60), now));
    }

    #[test]
    fn running_past_timeout_is_interrupted() {
        let now = Utc::now();
        let start = now - chrono::Duration::seconds(61);
        assert!(is_interrupted(Some(start), Duration::from_secs(60), now));
    }

    #[test]
    fn start_time_in_future_is_not_interrupted() {
        let now = Utc::now();
        let start = now + chrono::Duration::seconds(5);
        assert!(!is_interrupted(Some(start), Duration::from_secs(60), now));
    }
}
