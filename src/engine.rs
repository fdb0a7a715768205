use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, warn};

use crate::context::RunContext;
use crate::error::SiftError;
use crate::output::Writer;
use crate::pool::{EntryPool, ProbePool};
use crate::probe::Prober;
use crate::record::Record;
use crate::results::Summary;
use crate::source::Source;

// ---------------------------------------------------------------------------
// Engine options
// ---------------------------------------------------------------------------

/// Internal options passed from the builder to `run()` and `replay()`.
pub(crate) struct EngineOptions {
    pub ctx:     RunContext,
    pub roots:   Vec<PathBuf>,
    pub source:  Arc<dyn Source>,
    pub prober:  Arc<dyn Prober>,
    pub workers: usize,
    pub writer:  Writer<Box<dyn Write>>,
}

// ---------------------------------------------------------------------------
// run()
// ---------------------------------------------------------------------------

/// Walk, probe and select every entry under the roots.
///
/// Called by `SearchBuilder::run()` after validating inputs. The calling
/// thread is the single consumer: it drains the record channel, selects and
/// prints. A root that fails to walk ends up in [`Summary::errors`]; only a
/// failure to start the worker pools is returned as `Err`.
pub(crate) fn run(opts: EngineOptions) -> Result<Summary, SiftError> {
    let EngineOptions { ctx, roots, source, prober, workers, mut writer } = opts;
    let start = Instant::now();

    let entry_pool = EntryPool::new(source);
    let probe_pool = ProbePool::new(prober, workers);

    let entries = entry_pool.start(&ctx, &roots)?;
    let records = probe_pool.start(&ctx, entries)?;

    let mut sink = Sink::default();
    for record in records.iter() {
        sink.write(&ctx, &mut writer, &record);
    }
    sink.flush(&mut writer);

    let errors = entry_pool.take_err().into_iter().collect();
    Ok(summarize(start, &ctx, sink, writer, errors))
}

// ---------------------------------------------------------------------------
// replay()
// ---------------------------------------------------------------------------

/// Re-run selection over a dumped index without walking or probing.
///
/// Each line is a flat JSON object of string values. Lines that do not parse,
/// invalid UTF-8 included, are logged and skipped; a read failure stops the replay and is reported in
/// [`Summary::errors`].
pub(crate) fn replay(
    ctx: RunContext,
    input: impl BufRead,
    mut writer: Writer<Box<dyn Write>>,
) -> Summary {
    let start = Instant::now();
    let mut sink = Sink::default();
    let mut errors = Vec::new();

    for (n, line) in input.split(b'\n').enumerate() {
        if ctx.is_cancelled() {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                errors.push(SiftError::io("-", e));
                break;
            }
        };
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let record: Record = match serde_json::from_slice(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!(line = n + 1, error = %e, "invalid index line");
                continue;
            }
        };
        sink.write(&ctx, &mut writer, &record);
    }
    sink.flush(&mut writer);

    summarize(start, &ctx, sink, writer, errors)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Tracks output state across records.
#[derive(Default)]
struct Sink {
    accepted: usize,
    closed:   bool,
}

impl Sink {
    /// Output failures are logged per record and never end the run. A broken
    /// pipe means nobody is reading any more: the run is cancelled and the
    /// remaining records are drained without output.
    fn write(&mut self, ctx: &RunContext, writer: &mut Writer<Box<dyn Write>>, record: &Record) {
        if self.closed {
            return;
        }
        match writer.write(ctx, record) {
            Ok(true) => self.accepted += 1,
            Ok(false) => {}
            Err(SiftError::Output(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!("output closed, cancelling run");
                self.closed = true;
                ctx.cancel();
            }
            Err(e) => {
                error!(path = record.get("path").unwrap_or_default(), error = %e, "failed to output");
            }
        }
    }

    fn flush(&mut self, writer: &mut Writer<Box<dyn Write>>) {
        if self.closed {
            return;
        }
        if let Err(e) = writer.flush() {
            error!(error = %e, "failed to flush output");
        }
    }
}

fn summarize(
    start: Instant,
    ctx: &RunContext,
    sink: Sink,
    writer: Writer<Box<dyn Write>>,
    errors: Vec<SiftError>,
) -> Summary {
    Summary {
        accepted: sink.accepted,
        paths:    writer.into_paths(),
        duration: start.elapsed(),
        metrics:  ctx.metrics().snapshot(),
        errors,
    }
}
