//! Dismiss command - clear locally tracked sync state.

use anyhow::Result;
use console::style;

use leadline_sync::{FileJobStore, JobStatus, JobStore, SyncConfig};

pub fn run(config: SyncConfig) -> Result<()> {
    let store = FileJobStore::new(config.state_path.clone());

    match store.load() {
        Some(job) => {
            if job.status == JobStatus::Running {
                println!(
                    "{}",
                    style("The server-side job keeps running; only local tracking is cleared")
                        .yellow()
                );
            }
            store.clear();
            println!("Cleared sync state for job {}", job.id);
        }
        None => println!("Nothing to clear"),
    }

    Ok(())
}
