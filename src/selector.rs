use std::io::{self, Write};
use std::process::{Command, Stdio};

use regex::Regex;
use tracing::debug;

use crate::context::RunContext;
use crate::record::Record;

/// Decides whether a record is selected.
///
/// Every leaf evaluation bumps the "selection attempted" counter once and
/// then either the success or the failure counter; composites count nothing
/// themselves.
///
/// # Thread Safety
///
/// `Send + Sync` are required. A selector tree is built once and then
/// evaluated concurrently without synchronization, so implementations must
/// not carry mutable state.
///
/// # Example
///
/// ```rust
/// use metasift::{Record, RunContext, Selector};
///
/// struct LargeFile(u64);
///
/// impl Selector for LargeFile {
///     fn select(&self, _ctx: &RunContext, record: &Record) -> bool {
///         record
///             .get("size")
///             .and_then(|s| s.parse::<u64>().ok())
///             .is_some_and(|size| size > self.0)
///     }
/// }
///
/// let record: Record = [("size", "2048")].into_iter().collect();
/// assert!(LargeFile(1024).select(&RunContext::new(), &record));
/// ```
pub trait Selector: Send + Sync {
    fn select(&self, ctx: &RunContext, record: &Record) -> bool;
}

impl<S: Selector + ?Sized> Selector for Box<S> {
    fn select(&self, ctx: &RunContext, record: &Record) -> bool {
        (**self).select(ctx, record)
    }
}

impl<S: Selector + ?Sized> Selector for std::sync::Arc<S> {
    fn select(&self, ctx: &RunContext, record: &Record) -> bool {
        (**self).select(ctx, record)
    }
}

// ---------------------------------------------------------------------------
// Leaves
// ---------------------------------------------------------------------------

/// Selects records whose `key` field matches a regex anywhere in the value.
///
/// A record without `key` is not selected and counts as missing data.
#[derive(Debug, Clone)]
pub struct RegexSelector {
    key:     String,
    pattern: Regex,
}

impl RegexSelector {
    pub fn new(key: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            key:     key.into(),
            pattern: Regex::new(pattern)?,
        })
    }
}

impl Selector for RegexSelector {
    fn select(&self, ctx: &RunContext, record: &Record) -> bool {
        let metrics = ctx.metrics();
        metrics.select_attempted();

        let Some(value) = record.get(&self.key) else {
            debug!(key = %self.key, r = %self.pattern, found = false, result = false, "regex selector");
            metrics.select_missing();
            metrics.select_failed();
            return false;
        };

        let matched = self.pattern.is_match(value);
        debug!(key = %self.key, r = %self.pattern, found = true, value, result = matched, "regex selector");
        if matched {
            metrics.select_succeeded();
        } else {
            metrics.select_failed();
        }
        matched
    }
}

/// Runs a script and selects the record when it exits with status 0.
///
/// The script is run as `<shell> -c <script>` with the current environment.
/// The record is written to its stdin as one line of JSON. Any failure to
/// run the script counts as a non-match.
#[derive(Debug, Clone)]
pub struct ScriptSelector {
    shell:  String,
    script: String,
}

impl ScriptSelector {
    pub fn new(shell: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            shell:  shell.into(),
            script: script.into(),
        }
    }

    fn run(&self, record: &Record) -> io::Result<()> {
        let mut input = record.to_json().map_err(io::Error::other)?;
        input.push('\n');

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(&self.script)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            // a script that never reads its input closes the pipe early
            if let Err(e) = stdin.write_all(input.as_bytes()) {
                if e.kind() != io::ErrorKind::BrokenPipe {
                    let _ = child.wait();
                    return Err(e);
                }
            }
        }

        let status = child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("script exited with {}", status)))
        }
    }
}

impl Selector for ScriptSelector {
    fn select(&self, ctx: &RunContext, record: &Record) -> bool {
        let metrics = ctx.metrics();
        metrics.select_attempted();

        let result = if ctx.is_cancelled() {
            Err(io::Error::new(io::ErrorKind::Interrupted, "run cancelled"))
        } else {
            self.run(record)
        };

        match result {
            Ok(()) => {
                debug!(shell = %self.shell, result = true, "script selector");
                metrics.select_succeeded();
                true
            }
            Err(e) => {
                debug!(shell = %self.shell, result = false, error = %e, "script selector");
                metrics.select_failed();
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Composites
// ---------------------------------------------------------------------------

/// Selects when every child selects. Stops at the first child that does not,
/// so later children are never evaluated. With no children, selects
/// everything.
#[derive(Default)]
pub struct AndSelector {
    children: Vec<Box<dyn Selector>>,
}

impl AndSelector {
    pub fn new(children: Vec<Box<dyn Selector>>) -> Self {
        Self { children }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Selector for AndSelector {
    fn select(&self, ctx: &RunContext, record: &Record) -> bool {
        self.children.iter().all(|c| c.select(ctx, record))
    }
}

/// Selects when any child selects. Stops at the first child that does. With
/// no children, selects nothing.
#[derive(Default)]
pub struct OrSelector {
    children: Vec<Box<dyn Selector>>,
}

impl OrSelector {
    pub fn new(children: Vec<Box<dyn Selector>>) -> Self {
        Self { children }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Selector for OrSelector {
    fn select(&self, ctx: &RunContext, record: &Record) -> bool {
        self.children.iter().any(|c| c.select(ctx, record))
    }
}
