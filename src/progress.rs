//! Progress aggregation over a job's sub-tasks.

use serde::Serialize;

use crate::job::{AccountSyncTask, TaskStatus};

/// Aggregate view of a snapshot's sub-task list.
///
/// Derived state only, recomputed from each Running snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncProgress {
    pub completed_count: usize,
    pub total_count: usize,
    /// 0..=100, rounded; 0 when the job reports no sub-tasks.
    pub percent: u8,
    /// First sub-task the server reports as currently running.
    pub active_task: Option<AccountSyncTask>,
}

impl SyncProgress {
    pub fn from_tasks(tasks: &[AccountSyncTask]) -> Self {
        let total_count = tasks.len();
        let completed_count = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        let percent = if total_count > 0 {
            ((completed_count as f64 / total_count as f64) * 100.0).round() as u8
        } else {
            0
        };
        let active_task = tasks
            .iter()
            .find(|t| t.status == TaskStatus::Running)
            .cloned();

        Self {
            completed_count,
            total_count,
            percent,
            active_task,
        }
    }
}
