//! # metasift
//!
//! Find files by the metadata an external prober reports about them.
//!
//! A run walks one or more roots, probes every file it finds (by default
//! with `ffprobe`), merges the probe output with filesystem attributes into a
//! flat [`Record`], and prints the records a [`Selector`] accepts.
//!
//! ```text
//! roots ─► EntryPool ─► bounded channel ─► ProbePool ─► bounded channel ─► Selector ─► output
//! ```
//!
//! Both pools are fan-in stages built on threads and bounded channels, so a
//! slow prober applies backpressure to the walkers. There is no ordering
//! guarantee across roots or probe workers.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use metasift::query::parse_command_line;
//!
//! let selector = parse_command_line(&["ext=mp3", "artist=Someone"]).unwrap();
//! let summary = metasift::search()
//!     .roots(["/music"])
//!     .selector(selector)
//!     .workers(8)
//!     .run()
//!     .unwrap();
//!
//! eprintln!("{} matches in {:.3}s", summary.accepted, summary.duration.as_secs_f64());
//! ```
//!
//! # Custom Sources and Probers
//!
//! Implement [`Source`] to feed entries from anywhere, and [`Prober`] to
//! enrich them with something other than `ffprobe`:
//!
//! ```rust
//! use std::path::Path;
//! use metasift::{Prober, Record, RunContext, SiftError};
//!
//! struct LengthProber;
//!
//! impl Prober for LengthProber {
//!     fn probe(&self, _ctx: &RunContext, path: &Path) -> Result<Record, SiftError> {
//!         let len = path.as_os_str().len().to_string();
//!         Ok([("path_len", len)].into_iter().collect())
//!     }
//! }
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod pool;
pub mod query;

mod builder;
mod context;
mod engine;
mod entry;
mod error;
mod metrics;
mod output;
mod probe;
mod record;
mod results;
mod selector;
mod source;

// ── Public re-exports ─────────────────────────────────────────────────────────

pub use builder::SearchBuilder;
pub use config::Config;
pub use context::RunContext;
pub use entry::{Entry, FileInfo};
pub use error::SiftError;
pub use metrics::{Metrics, MetricsSnapshot};
pub use output::Writer;
pub use probe::{assemble, parse_document, FfProber, Prober};
pub use record::{Record, TIME_FORMAT};
pub use results::Summary;
pub use selector::{AndSelector, OrSelector, RegexSelector, ScriptSelector, Selector};
pub use source::{Entries, ListingSource, Source, TreeSource, Walk};

// ── Entry point ───────────────────────────────────────────────────────────────

/// Create a new [`SearchBuilder`] to configure and run a search.
///
/// # Example
///
/// ```rust
/// use std::path::Path;
/// use metasift::{Prober, Record, RunContext, SiftError};
///
/// struct NoProbe;
///
/// impl Prober for NoProbe {
///     fn probe(&self, _ctx: &RunContext, _path: &Path) -> Result<Record, SiftError> {
///         Ok(Record::new())
///     }
/// }
///
/// let dir = std::env::temp_dir();
/// let summary = metasift::search()
///     .roots([dir.join("metasift-doc-missing-root")])
///     .prober(NoProbe)
///     .output(std::io::sink())
///     .run()
///     .unwrap();
///
/// assert_eq!(summary.accepted, 0);
/// assert_eq!(summary.errors.len(), 1);
/// ```
pub fn search() -> SearchBuilder {
    SearchBuilder::default()
}
