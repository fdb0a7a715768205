use std::time::Duration;

use serde::Serialize;

use crate::error::SiftError;
use crate::metrics::MetricsSnapshot;

/// The outcome of a completed run.
///
/// `paths` is opt-in; enable it with `.collect_paths(true)` on the builder.
#[derive(Debug, Default)]
pub struct Summary {
    /// Number of records the selector accepted and that were written out.
    pub accepted: usize,

    /// `path` of every accepted record, in output order. Only populated if
    /// `.collect_paths(true)` was set on the builder.
    pub paths: Vec<String>,

    /// Wall-clock time from run start to drain.
    pub duration: Duration,

    /// Counters at the end of the run.
    pub metrics: MetricsSnapshot,

    /// Non-fatal errors that ended part of the run: the first root that failed
    /// to walk, or a read failure during replay. Records produced before the
    /// failure were still selected and printed.
    pub errors: Vec<SiftError>,
}

#[derive(Serialize)]
struct SummaryJson<'a> {
    #[serde(rename = "Duration")]
    duration: f64,
    #[serde(rename = "Metrics")]
    metrics: &'a MetricsSnapshot,
}

impl Summary {
    /// Render as `{"Duration": <seconds>, "Metrics": {...}}`.
    pub fn to_json(&self) -> String {
        let json = SummaryJson {
            duration: self.duration.as_secs_f64(),
            metrics:  &self.metrics,
        };
        serde_json::to_string(&json).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_has_duration_and_metrics() {
        let summary = Summary {
            duration: Duration::from_millis(1500),
            metrics:  MetricsSnapshot { accept_count: 2, ..Default::default() },
            ..Default::default()
        };
        let v: serde_json::Value = serde_json::from_str(&summary.to_json()).unwrap();
        assert_eq!(v["Duration"], 1.5);
        assert_eq!(v["Metrics"]["AcceptCount"], 2);
    }
}
