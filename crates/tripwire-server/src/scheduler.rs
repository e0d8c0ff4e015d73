use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tripwire_alert::RuleEvaluator;

/// Drives [`RuleEvaluator::run_cycle`] on a fixed interval until shutdown.
pub struct EvaluationScheduler {
    evaluator: RuleEvaluator,
    interval_secs: u64,
    running: Arc<AtomicBool>,
}

impl EvaluationScheduler {
    pub fn new(evaluator: RuleEvaluator, interval_secs: u64, running: Arc<AtomicBool>) -> Self {
        Self {
            evaluator,
            interval_secs: interval_secs.max(1),
            running,
        }
    }

    /// Runs until `shutdown` flips to `true` or its sender is dropped. A
    /// cycle in progress always completes; shutdown is only observed
    /// between cycles.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_secs = self.interval_secs, "Evaluation scheduler started");
        self.running.store(true, Ordering::SeqCst);

        let mut tick = interval(Duration::from_secs(self.interval_secs));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.evaluator.run_cycle(Utc::now()).await {
                        tracing::error!(error = %e, "Evaluation cycle failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Evaluation scheduler stopped");
    }
}
