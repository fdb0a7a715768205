//! The two fan-in worker stages of the pipeline.
//!
//! ```text
//! roots ──► EntryPool (one thread per root) ──► bounded(100) ──►
//!           ProbePool (N threads) ──► bounded(100) ──► selection/output
//! ```
//!
//! Each pool spawns its workers plus one supervisor thread. Workers hold
//! clones of the output sender; the supervisor holds the last one, joins every
//! worker, and only then drops it. The output channel therefore disconnects
//! exactly once, after all workers are done, and any error a worker recorded
//! is final by the time the consumer sees the disconnect.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error};

use crate::context::RunContext;
use crate::entry::Entry;
use crate::error::SiftError;
use crate::probe::{assemble, Prober};
use crate::record::Record;
use crate::source::Source;

/// Capacity of the channel between the walkers and the probe workers.
pub const ENTRY_BUFFER: usize = 100;

/// Capacity of the channel between the probe workers and the consumer.
pub const RECORD_BUFFER: usize = 100;

// ---------------------------------------------------------------------------
// EntryPool
// ---------------------------------------------------------------------------

/// Walks every root concurrently into one shared entry channel.
///
/// The first root to fail has its error kept (first error wins); the other
/// roots keep walking and delivering entries.
pub struct EntryPool {
    source: Arc<dyn Source>,
    err:    Arc<Mutex<Option<SiftError>>>,
}

impl EntryPool {
    pub fn new(source: Arc<dyn Source>) -> Self {
        Self {
            source,
            err: Arc::new(Mutex::new(None)),
        }
    }

    /// Start one walker thread per root and return the shared entry channel.
    ///
    /// The channel disconnects after every walker has finished. Once the
    /// context is cancelled, walkers stop sending; a send already blocked on a
    /// full channel still completes.
    pub fn start(&self, ctx: &RunContext, roots: &[PathBuf]) -> Result<Receiver<Entry>, SiftError> {
        if let Ok(mut err) = self.err.lock() {
            *err = None;
        }
        let (tx, rx) = bounded::<Entry>(ENTRY_BUFFER);

        let mut handles = Vec::with_capacity(roots.len());
        for (id, root) in roots.iter().enumerate() {
            let source = Arc::clone(&self.source);
            let err    = Arc::clone(&self.err);
            let tx     = tx.clone();
            let ctx    = ctx.clone();
            let root   = root.clone();

            let handle = thread::Builder::new()
                .name(format!("walker-{}", id))
                .spawn(move || walk_root(id, source.as_ref(), &root, &ctx, &tx, &err))
                .map_err(|e| SiftError::ThreadPool(format!("failed to spawn walker: {}", e)))?;
            handles.push(handle);
        }

        supervise("walker", handles, tx)?;
        Ok(rx)
    }

    /// Take the first error any root reported.
    ///
    /// Only meaningful once the channel returned by [`start`](Self::start)
    /// has been drained.
    pub fn take_err(&self) -> Option<SiftError> {
        self.err.lock().ok().and_then(|mut e| e.take())
    }
}

fn walk_root(
    id: usize,
    source: &dyn Source,
    root: &Path,
    ctx: &RunContext,
    tx: &Sender<Entry>,
    err: &Mutex<Option<SiftError>>,
) {
    debug!(n = id, root = %root.display(), "walker start");

    let mut walk = source.walk(root, ctx);
    for entry in walk.by_ref() {
        if ctx.is_cancelled() {
            break;
        }
        if tx.send(entry).is_err() {
            // consumer is gone
            break;
        }
    }

    if let Err(e) = walk.finish() {
        debug!(n = id, root = %root.display(), error = %e, "walker failed");
        if let Ok(mut slot) = err.lock() {
            slot.get_or_insert(e);
        }
    }
}

// ---------------------------------------------------------------------------
// ProbePool
// ---------------------------------------------------------------------------

/// Turns entries into records with a fixed number of probe workers.
///
/// Output order across workers is unspecified. A slow or failing probe only
/// holds up its own worker.
pub struct ProbePool {
    prober:  Arc<dyn Prober>,
    workers: usize,
}

impl ProbePool {
    /// `workers` is clamped to at least one.
    pub fn new(prober: Arc<dyn Prober>, workers: usize) -> Self {
        Self {
            prober,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Start the workers and return the record channel. Workers exit when
    /// `entries` disconnects; the record channel disconnects after all of
    /// them have exited.
    pub fn start(&self, ctx: &RunContext, entries: Receiver<Entry>) -> Result<Receiver<Record>, SiftError> {
        let (tx, rx) = bounded::<Record>(RECORD_BUFFER);

        let mut handles = Vec::with_capacity(self.workers);
        for id in 0..self.workers {
            let prober  = Arc::clone(&self.prober);
            let entries = entries.clone();
            let tx      = tx.clone();
            let ctx     = ctx.clone();

            let handle = thread::Builder::new()
                .name(format!("prober-{}", id))
                .spawn(move || {
                    debug!(n = id, "prober start");
                    for entry in entries.iter() {
                        let record = assemble(&ctx, prober.as_ref(), &entry);
                        if tx.send(record).is_err() {
                            break;
                        }
                    }
                })
                .map_err(|e| SiftError::ThreadPool(format!("failed to spawn prober: {}", e)))?;
            handles.push(handle);
        }

        supervise("prober", handles, tx)?;
        Ok(rx)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Join `handles` on a dedicated thread, then drop `tx` so the channel
/// disconnects.
fn supervise<T: Send + 'static>(
    name: &'static str,
    handles: Vec<JoinHandle<()>>,
    tx: Sender<T>,
) -> Result<(), SiftError> {
    thread::Builder::new()
        .name(format!("{}-supervisor", name))
        .spawn(move || {
            for handle in handles {
                if handle.join().is_err() {
                    error!(pool = name, "worker panicked");
                }
            }
            drop(tx);
            debug!(pool = name, "pool stop");
        })
        .map(|_| ())
        .map_err(|e| SiftError::ThreadPool(format!("failed to spawn {} supervisor: {}", name, e)))
}
