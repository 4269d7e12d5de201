use std::time::Duration;

use log::{debug, info};

use crate::{async_coordinator::AsyncCoordinator, loss};

/// Backoff applied when the update counter hasn't advanced by `checkEvery`
/// since the last sample.
const BACKOFF: Duration = Duration::from_secs(2);

/// The async loss monitor (C6): a background cooperative task sampling the
/// shared cell's weights, computing a smoothed local loss, and deciding
/// whether the run should stop.
///
/// Runs until the coordinator's run becomes terminal, either because
/// `updateGrad` hit `maxSteps` or because this loop's own stopping check
/// fires and calls `end_computation` itself.
pub(crate) async fn run(coordinator: AsyncCoordinator) {
    let mut last_checked: u64 = 0;
    let mut smoothed: Option<f64> = None;
    // Most-recent-first, mirroring the sync loop's trace.
    let mut trace: Vec<f64> = Vec::new();

    loop {
        if !coordinator.cell().is_running() {
            return;
        }

        let Some((grad, updates)) = coordinator.cell().snapshot() else {
            return;
        };

        let config = match coordinator.cell().config() {
            Some(config) => config,
            None => return,
        };

        if updates.saturating_sub(last_checked) < config.check_every {
            tokio::time::sleep(BACKOFF).await;
            continue;
        }

        let raw_loss = loss::local_full(coordinator.dataset(), coordinator.model(), &grad);
        let previous = smoothed.unwrap_or(raw_loss);
        let leaked = config.leak_coef * raw_loss + (1.0 - config.leak_coef) * previous;
        smoothed = Some(leaked);

        let improved = coordinator.cell().observe_loss(leaked, &grad);
        debug!(updates = updates, loss = leaked, improved = improved; "async loss sample");

        trace.insert(0, leaked);
        last_checked = updates;

        if (config.stopping)(&trace) {
            info!(target: "master.async", updates = updates, loss = leaked; "stopping criterion reached");
            coordinator.end_computation().await;
            return;
        }

        // Yield back to the scheduler between samples even when not backing off,
        // so a fast stream of updates can't starve this task's own runtime thread.
        tokio::task::yield_now().await;
    }
}
