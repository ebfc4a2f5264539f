use tokio::time::{interval, MissedTickBehavior};

use crate::state::AppState;

/// Start the training poll scheduler as a background tokio task
pub fn start_training_poll(state: AppState) {
    let poller = state.training_poller();
    let period = poller.sweep_interval();

    tokio::spawn(async move {
        tracing::info!("[TrainingPoll] Scheduler started, sweeping every {}s", period.as_secs());

        let mut sweep_interval = interval(period);
        sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            sweep_interval.tick().await;
            let report = poller.sweep().await;
            if report.failed > 0 {
                tracing::debug!(
                    "[TrainingPoll] {} of {} status queries failed, will retry on backoff",
                    report.failed,
                    report.polled
                );
            }
        }
    });
}
