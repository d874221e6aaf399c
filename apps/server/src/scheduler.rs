//! Periodic retrosync loop.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use sheetsync_core::sync::{next_run_delay_secs, RETROSYNC_INTERVAL_JITTER_SECS};

use crate::main_lib::{AppState, RetrosyncTrigger};

fn jitter_secs() -> u64 {
    rand::thread_rng().gen_range(0..=RETROSYNC_INTERVAL_JITTER_SECS)
}

/// Starts the background loop once. A zero interval leaves it disabled.
///
/// The loop exits when `shutdown` flips to `true` or its sender is dropped.
pub async fn ensure_retrosync_loop_started(
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let interval_secs = state.config.retrosync_interval_secs;
    if interval_secs == 0 {
        info!("[Retrosync] Background loop disabled");
        return;
    }

    let mut guard = state.retrosync_runtime.background_task.lock().await;
    if guard.as_ref().is_some_and(|handle| !handle.is_finished()) {
        return;
    }

    let loop_state = Arc::clone(&state);
    let handle = tokio::spawn(async move {
        let mut consecutive_failures: u32 = 0;
        loop {
            let delay = next_run_delay_secs(interval_secs, consecutive_failures) + jitter_secs();
            debug!("[Retrosync] Next scheduled run in {}s", delay);

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(delay)) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let report = loop_state.run_retrosync(RetrosyncTrigger::Scheduled).await;
            if report.ok {
                consecutive_failures = 0;
                if let Some(reason) = &report.skipped {
                    debug!("[Retrosync] Scheduled run skipped: {}", reason);
                }
            } else {
                consecutive_failures = consecutive_failures.saturating_add(1);
                warn!(
                    "[Retrosync] Scheduled run failed ({} in a row): {}",
                    consecutive_failures,
                    report.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        info!("[Retrosync] Background loop stopped");
    });

    *guard = Some(handle);
    info!(
        "[Retrosync] Background loop started (every {}s)",
        interval_secs
    );
}

/// Aborts the loop if it is still running.
pub async fn stop_retrosync_loop(state: &AppState) {
    if let Some(handle) = state.retrosync_runtime.background_task.lock().await.take() {
        handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_bound() {
        for _ in 0..100 {
            assert!(jitter_secs() <= RETROSYNC_INTERVAL_JITTER_SECS);
        }
    }
}
