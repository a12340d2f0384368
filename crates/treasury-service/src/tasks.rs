//! Scheduled maintenance: periodic snapshot/mirror flush and the anomaly
//! sweep. Both run as detached cooperative tasks that take the engine lock
//! only for the duration of one pass.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use treasury_core::TreasuryEngine;

#[derive(Debug, Clone)]
pub struct TaskConfig {
    /// Full-table autosave cadence (local write + remote mirror).
    pub flush_interval: Duration,
    /// Anomaly sweep cadence.
    pub sweep_interval: Duration,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(12 * 60 * 60),
        }
    }
}

pub fn spawn_background_tasks(
    engine: Arc<Mutex<TreasuryEngine>>,
    config: TaskConfig,
) -> Vec<JoinHandle<()>> {
    let flush_engine = engine.clone();
    let flush_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick fires immediately; skip it, bootstrap just loaded
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let engine = flush_engine.lock().await;
            engine.flush_all_sync().await;
            info!("periodic economy autosave complete");
        }
    });

    let sweep_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let mut engine = engine.lock().await;
            let report = engine.run_sweep();
            if report.is_clean() {
                info!("periodic anomaly sweep: ledger healthy");
            } else {
                warn!(
                    clamped = report.negative_clamped.len(),
                    corrected = report.magnitude_corrected.len(),
                    flagged = report.magnitude_flagged.len(),
                    "periodic anomaly sweep found issues"
                );
            }
        }
    });

    vec![flush_task, sweep_task]
}
