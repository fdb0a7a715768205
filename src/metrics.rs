use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Run-wide counters, shared by every stage of the pipeline.
///
/// Counters only ever grow. Read them with [`Metrics::snapshot`] once the run
/// has drained.
#[derive(Debug, Default)]
pub struct Metrics {
    entries:             AtomicU64,
    probes:              AtomicU64,
    probe_successes:     AtomicU64,
    probe_failures:      AtomicU64,
    selections:          AtomicU64,
    selection_successes: AtomicU64,
    selection_failures:  AtomicU64,
    selection_missing:   AtomicU64,
    accepted:            AtomicU64,
}

/// A point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricsSnapshot {
    pub entry_count:               u64,
    pub probe_count:               u64,
    pub probe_success_count:       u64,
    pub probe_failed_count:        u64,
    pub select_count:              u64,
    pub select_success_count:      u64,
    pub select_failed_count:       u64,
    pub select_data_missing_count: u64,
    pub accept_count:              u64,
}

fn incr(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_seen(&self)        { incr(&self.entries) }
    pub fn probe_attempted(&self)   { incr(&self.probes) }
    pub fn probe_succeeded(&self)   { incr(&self.probe_successes) }
    pub fn probe_failed(&self)      { incr(&self.probe_failures) }
    pub fn select_attempted(&self)  { incr(&self.selections) }
    pub fn select_succeeded(&self)  { incr(&self.selection_successes) }
    pub fn select_failed(&self)     { incr(&self.selection_failures) }
    pub fn select_missing(&self)    { incr(&self.selection_missing) }
    pub fn accepted(&self)          { incr(&self.accepted) }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            entry_count:               load(&self.entries),
            probe_count:               load(&self.probes),
            probe_success_count:       load(&self.probe_successes),
            probe_failed_count:        load(&self.probe_failures),
            select_count:              load(&self.selections),
            select_success_count:      load(&self.selection_successes),
            select_failed_count:       load(&self.selection_failures),
            select_data_missing_count: load(&self.selection_missing),
            accept_count:              load(&self.accepted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let m = Metrics::new();
        m.entry_seen();
        m.entry_seen();
        m.select_attempted();
        m.select_missing();
        m.select_failed();

        let s = m.snapshot();
        assert_eq!(s.entry_count, 2);
        assert_eq!(s.select_count, 1);
        assert_eq!(s.select_data_missing_count, 1);
        assert_eq!(s.select_failed_count, 1);
        assert_eq!(s.accept_count, 0);
    }

    #[test]
    fn snapshot_serializes_with_pascal_case_keys() {
        let json = serde_json::to_value(Metrics::new().snapshot()).unwrap();
        assert_eq!(json["EntryCount"], 0);
        assert_eq!(json["SelectDataMissingCount"], 0);
    }
}
