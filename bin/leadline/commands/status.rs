//! Status command - show the tracked sync job.

use std::sync::Arc;

use anyhow::Result;
use console::style;

use leadline_sync::{
    FileJobStore, HttpSyncTransport, JobStore, SyncConfig, SyncJob, SyncMonitor, SyncPhase,
    SyncProgress,
};

pub async fn run(config: SyncConfig, watch: bool) -> Result<()> {
    let store = FileJobStore::new(config.state_path.clone());

    if !watch {
        match store.load() {
            Some(job) => print_job(&job),
            None => println!("No sync in progress"),
        }
        return Ok(());
    }

    let transport = Arc::new(HttpSyncTransport::new(&config)?);
    let monitor = SyncMonitor::new(transport, Arc::new(store), config);

    if monitor.phase() != SyncPhase::Running {
        println!("No sync in progress");
        return Ok(());
    }

    super::sync::watch_until_terminal(&monitor).await
}

fn print_job(job: &SyncJob) {
    let progress = SyncProgress::from_tasks(&job.sub_tasks);

    println!("Sync {}", style(&job.id).bold());
    println!("  Status:   {:?}", job.status);
    println!("  Started:  {}", job.started_at);
    println!(
        "  Progress: {}% ({}/{} accounts)",
        progress.percent, progress.completed_count, progress.total_count
    );

    if let Some(task) = &progress.active_task {
        println!("  Syncing:  {} ({})", task.resource_id, task.platform_tag);
        if let Some(step) = &task.current_step {
            println!("            {}", step);
        }
    }

    if let Some(error) = &job.error {
        println!("  Error:    {}", style(error).red());
    }
}
