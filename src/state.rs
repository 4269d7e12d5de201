use std::{ops::Range, sync::Arc, time::Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{
    dataset::Dataset,
    error::{CoordinatorError, Result},
    vector::Vector,
};

/// A function selecting how the dataset is split across workers for an async run.
pub type SplitStrategy = Arc<dyn Fn(&Dataset, usize) -> Vec<Range<usize>> + Send + Sync>;

/// A predicate over the loss history (most-recent-first) deciding whether to stop.
pub type StoppingCriterion = Arc<dyn Fn(&[f64]) -> bool + Send + Sync>;

/// Immutable configuration for one async run.
#[derive(Clone)]
pub struct AsyncConfig {
    pub initial_weights: Vector,
    pub max_steps: u64,
    pub stopping: StoppingCriterion,
    pub batch_size: usize,
    pub split_strategy: SplitStrategy,
    pub check_every: u64,
    /// Exponential smoothing coefficient applied by the loss monitor. `1.0` (the
    /// default) disables smoothing: the monitor trusts each freshly sampled loss outright.
    pub leak_coef: f64,
}

/// The central state of a training run: current weights, update count, and
/// terminal markers. Doubles as the sync loop's return value and the async
/// coordinator's shared cell payload.
#[derive(Debug, Clone)]
pub struct GradState {
    pub grad: Vector,
    pub updates: u64,
    pub start: Instant,
    pub end: Option<Instant>,
    pub final_loss: Option<f64>,
}

impl GradState {
    /// Seeds a fresh run with `w`, stamping `start` at the first transition from empty.
    pub fn start(w: Vector) -> Self {
        Self { grad: w, updates: 0, start: Instant::now(), end: None, final_loss: None }
    }

    /// Subtracts `delta` from `grad` and increments `updates`.
    ///
    /// # Panics
    /// If the run is already terminal; callers must check `is_active` first.
    pub fn update(&mut self, delta: &Vector) {
        assert!(self.is_active(), "mutating a terminal GradState");
        self.grad = &self.grad - delta;
        self.updates += 1;
    }

    /// Swaps the weight vector outright, used when snapping back to the best observed grad.
    pub fn replace_grad(&mut self, w: Vector) {
        assert!(self.is_active(), "mutating a terminal GradState");
        self.grad = w;
    }

    /// Stamps `end` and `final_loss`, making the state terminal and immutable.
    pub fn finish(mut self, loss: f64) -> Self {
        self.end = Some(Instant::now());
        self.final_loss = Some(loss);
        self
    }

    /// Whether further mutation is still permitted.
    pub fn is_active(&self) -> bool {
        self.end.is_none()
    }
}

/// Tracks the best loss observed by the async loss monitor and the weights it came from.
#[derive(Debug, Clone)]
pub struct BestTracker {
    pub best_loss: f64,
    pub best_grad: Vector,
}

impl BestTracker {
    /// A fresh tracker: `bestLoss = +infinity`, `bestGrad = zeros`.
    pub fn reset(len: usize) -> Self {
        Self { best_loss: f64::INFINITY, best_grad: Vector::zeros(len) }
    }

    /// Updates the tracker if `loss` improves on the current best.
    ///
    /// # Returns
    /// Whether the tracker was updated.
    pub fn observe(&mut self, loss: f64, grad: &Vector) -> bool {
        if loss < self.best_loss {
            self.best_loss = loss;
            self.best_grad = grad.clone();
            true
        } else {
            false
        }
    }
}

/// Outcome of applying an inbound gradient update to the shared cell.
pub enum UpdateOutcome {
    /// The update was applied; `reached_max` tells the caller whether to terminate.
    Applied { updates: u64, reached_max: bool },
    /// The run had already ended; the caller should ack without error and do nothing else.
    Stale,
}

#[derive(Default)]
struct SharedState {
    grad_state: Option<GradState>,
    best: Option<BestTracker>,
    config: Option<AsyncConfig>,
    completion: Option<oneshot::Sender<GradState>>,
}

/// The single mutex-protected record holding `GradState`, `BestTracker`, the
/// async config, and the pending completion promise together.
///
/// Per the design notes, these are never sharded: every mutating access goes
/// through one of the methods below, each taking the lock exactly once, so
/// that `(grad, updates, best, end)` is always observed and mutated as a unit.
pub struct CoordinatorCell(Mutex<SharedState>);

impl CoordinatorCell {
    pub fn new() -> Self {
        Self(Mutex::new(SharedState::default()))
    }

    /// Atomic precondition check + init: fails if a run is already active,
    /// otherwise seeds a fresh `GradState`, resets the `BestTracker`, installs
    /// `config`, and returns the receiving end of a fresh completion channel.
    pub fn start_run(&self, config: AsyncConfig) -> Result<oneshot::Receiver<GradState>> {
        let mut guard = self.0.lock();

        let active = guard.grad_state.as_ref().is_some_and(GradState::is_active);
        if active {
            return Err(CoordinatorError::AlreadyRunning);
        }

        let (tx, rx) = oneshot::channel();
        guard.best = Some(BestTracker::reset(config.initial_weights.len()));
        guard.grad_state = Some(GradState::start(config.initial_weights.clone()));
        guard.completion = Some(tx);
        guard.config = Some(config);

        Ok(rx)
    }

    /// Whether a run is currently active (seeded and not yet terminal).
    pub fn is_running(&self) -> bool {
        self.0.lock().grad_state.as_ref().is_some_and(GradState::is_active)
    }

    /// A consistent snapshot of `(grad, updates)`, taken inside one lock acquisition.
    pub fn snapshot(&self) -> Option<(Vector, u64)> {
        self.0.lock().grad_state.as_ref().map(|gs| (gs.grad.clone(), gs.updates))
    }

    /// The active run's config, if any.
    pub fn config(&self) -> Option<AsyncConfig> {
        self.0.lock().config.clone()
    }

    /// Applies `delta` to the current grad, or reports staleness if the run has ended.
    pub fn apply_update(&self, delta: &Vector) -> UpdateOutcome {
        let mut guard = self.0.lock();

        let max_steps = guard.config.as_ref().map(|c| c.max_steps);

        match guard.grad_state.as_mut() {
            Some(gs) if gs.is_active() => {
                gs.update(delta);
                let updates = gs.updates;
                UpdateOutcome::Applied {
                    updates,
                    reached_max: max_steps.is_some_and(|max| updates >= max),
                }
            }
            _ => UpdateOutcome::Stale,
        }
    }

    /// Atomically records `loss` against the best tracker if it improves on it.
    pub fn observe_loss(&self, loss: f64, grad: &Vector) -> bool {
        match self.0.lock().best.as_mut() {
            Some(best) => best.observe(loss, grad),
            None => false,
        }
    }

    /// Terminates the run if it's still active: snapshots the best tracker,
    /// stamps `GradState` with it, and completes the pending promise.
    ///
    /// Idempotent: returns `None` if there was no active run to terminate.
    pub fn finish_run(&self) -> Option<GradState> {
        let mut guard = self.0.lock();

        let active = guard.grad_state.as_ref().is_some_and(GradState::is_active);
        if !active {
            return None;
        }

        let best = guard.best.clone().unwrap_or_else(|| BestTracker::reset(0));
        let mut gs = guard.grad_state.take().expect("checked active above");
        gs.replace_grad(best.best_grad);
        let gs = gs.finish(best.best_loss);

        guard.grad_state = Some(gs.clone());

        if let Some(tx) = guard.completion.take() {
            let _ = tx.send(gs.clone());
        }

        Some(gs)
    }
}

impl Default for CoordinatorCell {
    fn default() -> Self {
        Self::new()
    }
}
