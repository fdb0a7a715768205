use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::metrics::Metrics;

/// Shared state handed to every stage of a run: the cancel flag and the
/// run-wide counters.
///
/// Cloning is cheap; all clones observe the same flag and counters.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    cancelled: Arc<AtomicBool>,
    metrics:   Arc<Metrics>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every stage to stop issuing new work. In-flight subprocesses and
    /// channel sends are allowed to finish.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
