//! Sync command - start a job and watch it to a terminal state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use leadline_sync::{FileJobStore, HttpSyncTransport, SyncConfig, SyncMonitor, SyncPhase};

pub async fn run(config: SyncConfig) -> Result<()> {
    let transport = Arc::new(HttpSyncTransport::new(&config)?);
    let store = Arc::new(FileJobStore::new(config.state_path.clone()));
    let monitor = SyncMonitor::new(transport, store, config);

    if monitor.phase() == SyncPhase::Running {
        println!(
            "{}",
            style("A sync is already in progress, resuming it").yellow()
        );
    } else {
        monitor.begin().await;
    }

    watch_until_terminal(&monitor).await
}

/// Render progress until the tracked job reaches a terminal state.
pub(crate) async fn watch_until_terminal(monitor: &SyncMonitor) -> Result<()> {
    let bar = ProgressBar::new(100);
    bar.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {percent:>3}% {msg}",
    )?);

    {
        let bar = bar.clone();
        monitor.on_progress(move |_, progress| {
            bar.set_position(progress.percent as u64);
            match &progress.active_task {
                Some(task) => {
                    bar.set_message(format!("{} ({})", task.resource_id, task.platform_tag))
                }
                None => bar.set_message(""),
            }
        });
    }

    // Seed from the current snapshot in case the job is already mid-flight.
    bar.set_position(monitor.progress().percent as u64);

    while !monitor.phase().is_terminal() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    bar.finish_and_clear();

    match monitor.phase() {
        SyncPhase::Failed => {
            let reason = monitor
                .last_error()
                .unwrap_or_else(|| "unknown error".to_string());
            anyhow::bail!("sync failed: {}", reason);
        }
        _ => {
            let accounts = monitor
                .current_snapshot()
                .map(|job| job.sub_tasks.len())
                .unwrap_or(0);
            if accounts > 0 {
                println!(
                    "{} Sync completed ({} accounts)",
                    style("✔").green(),
                    accounts
                );
            } else {
                println!("{} Sync completed", style("✔").green());
            }
            Ok(())
        }
    }
}
