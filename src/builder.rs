use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use crate::context::RunContext;
use crate::engine::{self, EngineOptions};
use crate::error::SiftError;
use crate::output::Writer;
use crate::probe::{FfProber, Prober};
use crate::results::Summary;
use crate::selector::{AndSelector, Selector};
use crate::source::{Source, TreeSource};

// ---------------------------------------------------------------------------
// SearchBuilder
// ---------------------------------------------------------------------------

/// Entry point for configuring and executing a metasift run.
///
/// Created via [`metasift::search()`](crate::search). Configure with chained
/// builder methods, then call [`run()`](SearchBuilder::run) to walk and probe
/// the roots, or [`replay()`](SearchBuilder::replay) to select from a dumped
/// index.
///
/// # Example
///
/// ```rust,ignore
/// let summary = metasift::search()
///     .roots(["~/Music"])
///     .selector(metasift::query::parse_command_line(&["artist=Someone"])?)
///     .workers(8)
///     .run()?;
/// ```
pub struct SearchBuilder {
    roots:         Vec<PathBuf>,
    source:        Option<Arc<dyn Source>>,
    prober:        Option<Arc<dyn Prober>>,
    selector:      Option<Arc<dyn Selector>>,
    workers:       usize,
    verbose:       bool,
    collect_paths: bool,
    output:        Option<Box<dyn Write>>,
    context:       Option<RunContext>,
}

impl Default for SearchBuilder {
    fn default() -> Self {
        Self {
            roots:         Vec::new(),
            source:        None,
            prober:        None,
            selector:      None,
            workers:       num_cpus(),
            verbose:       false,
            collect_paths: false,
            output:        None,
            context:       None,
        }
    }
}

impl SearchBuilder {
    // ── Inputs ────────────────────────────────────────────────────────────

    /// Add roots to walk. Each root gets its own walker thread.
    pub fn roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.roots.extend(roots.into_iter().map(Into::into));
        self
    }

    /// Set the entry source. Defaults to [`TreeSource`].
    pub fn source(mut self, s: impl Source + 'static) -> Self {
        self.source = Some(Arc::new(s));
        self
    }

    /// Set the metadata prober. Defaults to [`FfProber`] running `ffprobe`.
    pub fn prober(mut self, p: impl Prober + 'static) -> Self {
        self.prober = Some(Arc::new(p));
        self
    }

    // ── Selection ─────────────────────────────────────────────────────────

    /// Set the selector. Without one, every record is selected.
    pub fn selector(mut self, s: impl Selector + 'static) -> Self {
        self.selector = Some(Arc::new(s));
        self
    }

    // ── Options ───────────────────────────────────────────────────────────

    /// Number of probe workers. Values below one are treated as one.
    ///
    /// Defaults to the number of logical CPU cores.
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    /// Print whole records as JSON lines instead of bare paths.
    pub fn verbose(mut self, yes: bool) -> Self {
        self.verbose = yes;
        self
    }

    /// Collect accepted paths into [`Summary::paths`].
    ///
    /// Disabled by default to avoid allocation overhead when paths aren't needed.
    pub fn collect_paths(mut self, yes: bool) -> Self {
        self.collect_paths = yes;
        self
    }

    /// Where accepted records are printed. Defaults to stdout.
    pub fn output(mut self, w: impl Write + 'static) -> Self {
        self.output = Some(Box::new(w));
        self
    }

    /// Run under an existing context, e.g. one a signal handler can cancel.
    pub fn context(mut self, ctx: RunContext) -> Self {
        self.context = Some(ctx);
        self
    }

    // ── Execute ───────────────────────────────────────────────────────────

    /// Walk every root, probe each file, select and print the matches.
    ///
    /// Blocks until the pipeline drains.
    ///
    /// # Errors
    ///
    /// Returns `Err` when no root was given or the worker threads could not
    /// be started. A root that fails mid-walk does not fail the run; its
    /// error is reported in [`Summary::errors`].
    pub fn run(mut self) -> Result<Summary, SiftError> {
        if self.roots.is_empty() {
            return Err(SiftError::Config("no root".into()));
        }
        let (ctx, writer) = self.writer();

        let source: Arc<dyn Source> = match self.source {
            Some(s) => s,
            None => Arc::new(TreeSource),
        };
        let prober: Arc<dyn Prober> = match self.prober {
            Some(p) => p,
            None => Arc::new(FfProber::default()),
        };

        let opts = EngineOptions {
            ctx,
            roots: self.roots,
            source,
            prober,
            workers: self.workers,
            writer,
        };
        engine::run(opts)
    }

    /// Select from a dumped index (JSON lines) without walking or probing.
    /// Roots, source, prober and workers are ignored.
    pub fn replay(mut self, input: impl BufRead) -> Result<Summary, SiftError> {
        let (ctx, writer) = self.writer();
        Ok(engine::replay(ctx, input, writer))
    }

    fn writer(&mut self) -> (RunContext, Writer<Box<dyn Write>>) {
        let ctx = self.context.take().unwrap_or_default();
        let selector: Arc<dyn Selector> = match self.selector.take() {
            Some(s) => s,
            None => Arc::new(AndSelector::default()),
        };
        let output: Box<dyn Write> = match self.output.take() {
            Some(w) => w,
            None => Box::new(io::stdout()),
        };

        let writer = Writer::new(output, selector, self.verbose).collect_paths(self.collect_paths);
        (ctx, writer)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Get the logical CPU count, with a safe fallback.
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
