use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use serde_json::Value;
use tracing::{debug, warn};

use crate::context::RunContext;
use crate::entry::Entry;
use crate::error::SiftError;
use crate::record::Record;

/// Extracts metadata for a single file.
///
/// Implementations must be idempotent per path and must not leave shared
/// state half-updated on failure. When the context is already cancelled they
/// should return [`SiftError::Cancelled`] instead of starting work.
///
/// # Thread Safety
///
/// `Send + Sync` are required; one prober is shared by every probe worker.
pub trait Prober: Send + Sync {
    fn probe(&self, ctx: &RunContext, path: &Path) -> Result<Record, SiftError>;
}

/// Probes media files with `ffprobe` (or a compatible command).
#[derive(Debug, Clone)]
pub struct FfProber {
    cmd: String,
}

impl FfProber {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }
}

impl Default for FfProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl Prober for FfProber {
    fn probe(&self, ctx: &RunContext, path: &Path) -> Result<Record, SiftError> {
        if ctx.is_cancelled() {
            return Err(SiftError::Cancelled);
        }
        let output = Command::new(&self.cmd)
            .args(["-v", "error", "-hide_banner"])
            .args(["-show_entries", "format"])
            .args(["-of", "json=c=1"])
            .arg(path)
            .output()
            .map_err(|e| probe_error(path, format!("failed to run {}: {}", self.cmd, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(probe_error(
                path,
                format!("{} exited with {}: {}", self.cmd, output.status, stderr.trim()),
            ));
        }
        parse_document(&output.stdout, path)
    }
}

fn probe_error(path: &Path, reason: impl Into<String>) -> SiftError {
    SiftError::Probe {
        path:   path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Turn a probe document into a flat record.
///
/// The document must be a JSON object with a `format` object. Keys of
/// `format` become record keys; a nested `tags` object is flattened into the
/// same level. On key collision the later value wins and a warning is logged.
pub fn parse_document(bytes: &[u8], path: &Path) -> Result<Record, SiftError> {
    let doc: Value = serde_json::from_slice(bytes)
        .map_err(|e| probe_error(path, format!("invalid document: {}", e)))?;

    let format = match doc.get("format") {
        Some(Value::Object(format)) => format,
        Some(_) => return Err(probe_error(path, "format is not an object")),
        None => return Err(probe_error(path, "format is not found")),
    };

    let mut fields = BTreeMap::new();
    let mut put = |key: &str, value: &Value| {
        let value = render(value);
        if let Some(old) = fields.get(key) {
            warn!(
                path = %path.display(),
                key,
                value = %old,
                new_value = %value,
                "duplicated probe metadata"
            );
        }
        fields.insert(key.to_string(), value);
    };

    for (key, value) in format {
        if key != "tags" {
            put(key, value);
            continue;
        }
        match value {
            Value::Object(tags) => {
                for (tag, tag_value) in tags {
                    put(tag, tag_value);
                }
            }
            _ => return Err(probe_error(path, "tags is not an object")),
        }
    }
    Ok(Record::from(fields))
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build the record for `entry`: filesystem fields merged with whatever the
/// prober reports. Never fails.
///
/// A probe failure is logged and leaves only the filesystem fields; a
/// cancelled probe leaves them too, silently. Probe fields overwrite
/// same-named filesystem fields.
pub fn assemble(ctx: &RunContext, prober: &dyn Prober, entry: &Entry) -> Record {
    let base = Record::from_entry(entry);
    let metrics = ctx.metrics();

    metrics.probe_attempted();
    match prober.probe(ctx, &entry.path) {
        Ok(probed) => {
            metrics.probe_succeeded();
            base.merge(probed)
        }
        Err(e) => {
            metrics.probe_failed();
            if e.is_cancelled() {
                debug!(path = %entry.path.display(), "probe skipped, run cancelled");
            } else {
                warn!(path = %entry.path.display(), error = %e, "failed to probe");
            }
            base
        }
    }
}
