//! Sync job records as reported by the Leadline API.
//!
//! A job is a long-running, server-executed synchronization task tracked by
//! id. Each poll returns the full record; the sub-task list is replaced
//! wholesale from the server snapshot, never merged client-side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal statuses stop polling permanently.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Status of one unit of work within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One external platform account being synchronized within a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSyncTask {
    /// Connected account resource this sub-task is syncing
    pub resource_id: String,
    /// Marketing platform the account belongs to (e.g. "mailchimp")
    pub platform_tag: String,
    pub status: TaskStatus,
    /// Step the server is currently on, if it reports one
    #[serde(default)]
    pub current_step: Option<String>,
}

/// Full snapshot of a sync job as last reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJob {
    pub id: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub sub_tasks: Vec<AccountSyncTask>,
}

impl SyncJob {
    /// Fresh Running record for a job the server just accepted.
    pub fn started(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
            sub_tasks: Vec::new(),
        }
    }

    /// Synthesized record for the legacy fire-and-forget sync path, which
    /// reports no job id and no per-account breakdown.
    pub fn legacy_completed() -> Self {
        let now = Utc::now();
        Self {
            id: "legacy".to_string(),
            status: JobStatus::Completed,
            started_at: now,
            finished_at: Some(now),
            error: None,
            sub_tasks: Vec::new(),
        }
    }
}
