use std::fs;
use std::io::{BufRead, Split};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::context::RunContext;
use crate::entry::{Entry, FileInfo};
use crate::error::SiftError;

/// Raw item stream produced by a [`Source`]. An `Err` item ends the traversal.
pub type Entries = Box<dyn Iterator<Item = Result<Entry, SiftError>>>;

/// A source of file entries for a root.
///
/// Implement this to feed the pipeline from anything traversable: directory
/// trees, path listings, in-memory fixtures.
///
/// # Thread Safety
///
/// `Send + Sync` are required. One source is shared by every root's walker
/// thread; each thread calls [`Source::entries`] for its own root, so the
/// returned iterator itself never crosses threads.
///
/// # Error Handling
///
/// A traversal error should be yielded as `Err(SiftError)`. [`Walk`] keeps it
/// as the terminal error and stops pulling; entries already yielded remain
/// valid.
pub trait Source: Send + Sync {
    /// Traverse `root` and yield its entries lazily.
    fn entries(&self, root: &Path) -> Entries;

    /// Traverse `root` under `ctx`, counting each yielded entry and stopping
    /// once the context is cancelled.
    fn walk(&self, root: &Path, ctx: &RunContext) -> Walk {
        Walk::new(self.entries(root), ctx.clone())
    }
}

/// A running traversal.
///
/// Yields entries until the source is exhausted, fails, or the context is
/// cancelled. The terminal error is only meaningful after the walk has been
/// drained or abandoned.
pub struct Walk {
    inner: Entries,
    ctx:   RunContext,
    err:   Option<SiftError>,
    done:  bool,
}

impl Walk {
    pub fn new(inner: Entries, ctx: RunContext) -> Self {
        Self { inner, ctx, err: None, done: false }
    }

    pub fn err(&self) -> Option<&SiftError> {
        self.err.as_ref()
    }

    /// Consume the walk and return its terminal error, if any.
    pub fn finish(self) -> Result<(), SiftError> {
        match self.err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Iterator for Walk {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        if self.done {
            return None;
        }
        if self.ctx.is_cancelled() {
            self.done = true;
            return None;
        }
        match self.inner.next() {
            Some(Ok(entry)) => {
                self.ctx.metrics().entry_seen();
                Some(entry)
            }
            Some(Err(e)) => {
                self.err = Some(e);
                self.done = true;
                None
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TreeSource
// ---------------------------------------------------------------------------

/// Recursively walks a directory and yields every non-directory entry.
///
/// Symlinks are not followed. Entries come out in lexical file-name order
/// within each directory. A root that is itself a file yields just that file.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeSource;

impl Source for TreeSource {
    fn entries(&self, root: &Path) -> Entries {
        Box::new(tree(root))
    }
}

fn tree(root: &Path) -> impl Iterator<Item = Result<Entry, SiftError>> {
    WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(false)
        .parents(false)
        .ignore(false)
        .follow_links(false)
        .same_file_system(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build()
        .filter_map(|res| {
            let dent = match res {
                Ok(d) => d,
                Err(e) => return Some(Err(map_ignore_error(e))),
            };
            debug!(path = %dent.path().display(), "tree walk");

            if dent.file_type().is_some_and(|ft| ft.is_dir()) {
                return None;
            }
            match dent.metadata() {
                Ok(md) => Some(Ok(Entry::new(dent.path(), FileInfo::from(&md)))),
                Err(e) => Some(Err(map_ignore_error(e))),
            }
        })
}

// ---------------------------------------------------------------------------
// ListingSource
// ---------------------------------------------------------------------------

/// Reads newline-delimited paths from a stream.
///
/// Lines are taken as raw bytes, so any file name the platform allows can be
/// listed. Empty and missing paths are skipped. Directories are expanded with
/// a nested walk (a [`TreeSource`] unless set with
/// [`expand_with`](Self::expand_with)) whose failure is logged without ending
/// the listing. Any other stat failure, or a read failure on the stream, ends
/// the listing.
///
/// The stream can only be read once: the first call to
/// [`entries`](Source::entries) takes it, later calls yield nothing. The root
/// argument is ignored.
pub struct ListingSource {
    reader: Mutex<Option<Box<dyn BufRead + Send>>>,
    expand: Arc<dyn Source>,
}

impl ListingSource {
    pub fn new(reader: impl BufRead + Send + 'static) -> Self {
        Self {
            reader: Mutex::new(Some(Box::new(reader))),
            expand: Arc::new(TreeSource),
        }
    }

    /// Set the source used to expand listed directories.
    pub fn expand_with(mut self, source: impl Source + 'static) -> Self {
        self.expand = Arc::new(source);
        self
    }
}

impl Source for ListingSource {
    fn entries(&self, _root: &Path) -> Entries {
        let reader = self.reader.lock().ok().and_then(|mut r| r.take());
        match reader {
            Some(reader) => Box::new(Listing {
                lines:  reader.split(b'\n'),
                expand: Arc::clone(&self.expand),
                nested: None,
                done:   false,
            }),
            None => {
                warn!("path listing was already consumed");
                Box::new(std::iter::empty())
            }
        }
    }
}

struct Listing {
    lines:  Split<Box<dyn BufRead + Send>>,
    expand: Arc<dyn Source>,
    nested: Option<(PathBuf, Entries)>,
    done:   bool,
}

impl Iterator for Listing {
    type Item = Result<Entry, SiftError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((root, nested)) = &mut self.nested {
                match nested.next() {
                    Some(Ok(entry)) => return Some(Ok(entry)),
                    Some(Err(e)) => {
                        warn!(path = %root.display(), error = %e, "nested walk failed");
                        self.nested = None;
                    }
                    None => self.nested = None,
                }
                continue;
            }
            if self.done {
                return None;
            }

            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(SiftError::io("-", e)));
                }
                None => {
                    self.done = true;
                    return None;
                }
            };
            let Some(path) = listed_path(line) else {
                continue;
            };

            match fs::metadata(&path) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "listed path does not exist");
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(SiftError::io(path, e)));
                }
                Ok(md) if md.is_dir() => {
                    let nested = self.expand.entries(&path);
                    self.nested = Some((path, nested));
                }
                Ok(md) => return Some(Ok(Entry::new(path, FileInfo::from(&md)))),
            }
        }
    }
}

/// Turn one raw listing line (without its `\n`) into a path. A trailing `\r`
/// is dropped; an empty line yields `None`.
fn listed_path(mut line: Vec<u8>) -> Option<PathBuf> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    if line.is_empty() {
        return None;
    }
    Some(path_from_bytes(line))
}

#[cfg(unix)]
fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    use std::os::unix::ffi::OsStringExt;
    PathBuf::from(std::ffi::OsString::from_vec(bytes))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
}

// ---------------------------------------------------------------------------
// Map ignore::Error to SiftError
// ---------------------------------------------------------------------------

fn map_ignore_error(e: ignore::Error) -> SiftError {
    match e {
        // the inner error carries no path of its own; re-attach this one
        ignore::Error::WithPath { path, err } => match map_ignore_error(*err) {
            SiftError::Io { source, .. } => SiftError::io(path, source),
            SiftError::PermissionDenied(_) => SiftError::PermissionDenied(path),
            SiftError::NotFound(_) => SiftError::NotFound(path),
            SiftError::Walk(msg) => SiftError::Walk(format!("{}: {}", path.display(), msg)),
            other => other,
        },
        ignore::Error::WithDepth { err, .. } => map_ignore_error(*err),
        ignore::Error::Loop { child, .. } => SiftError::SymlinkLoop(child),
        ignore::Error::Io(io_err) => SiftError::io(PathBuf::new(), io_err),
        other => SiftError::Walk(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn setup() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("b.mp3"), "b").unwrap();
        fs::write(root.join("a.mp3"), "a").unwrap();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("sub").join("c.flac"), "c").unwrap();
        dir
    }

    fn names(entries: impl Iterator<Item = Entry>) -> Vec<String> {
        entries.map(|e| e.name()).collect()
    }

    #[test]
    fn tree_yields_files_in_lexical_order() {
        let dir = setup();
        let ctx = RunContext::new();
        let mut walk = TreeSource.walk(dir.path(), &ctx);

        let got = names(walk.by_ref());
        assert_eq!(got, vec!["a.mp3", "b.mp3", "c.flac"]);
        assert!(walk.err().is_none());
        assert_eq!(ctx.metrics().snapshot().entry_count, 3);
    }

    #[test]
    fn tree_on_a_file_root_yields_the_file() {
        let dir = setup();
        let ctx = RunContext::new();
        let got = names(TreeSource.walk(&dir.path().join("a.mp3"), &ctx));
        assert_eq!(got, vec!["a.mp3"]);
    }

    #[test]
    fn tree_on_missing_root_records_error() {
        let dir = setup();
        let ctx = RunContext::new();
        let mut walk = TreeSource.walk(&dir.path().join("nope"), &ctx);

        assert!(walk.next().is_none());
        let err = walk.finish().unwrap_err();
        assert!(matches!(err, SiftError::NotFound(_)));
        assert_eq!(err.path(), Some(&dir.path().join("nope")));
    }

    /// Yields `ok` entries, then an error, then one more entry that must
    /// never be seen.
    struct FailsAfter(usize);

    impl Source for FailsAfter {
        fn entries(&self, root: &Path) -> Entries {
            let info = FileInfo {
                size:     0,
                mode:     0o644,
                modified: std::time::SystemTime::UNIX_EPOCH,
                is_dir:   false,
            };
            let root = root.to_path_buf();
            let after = Entry::new("after.mp3", info.clone());
            let items = (0..self.0)
                .map(move |i| Ok(Entry::new(root.join(format!("{}.mp3", i)), info.clone())))
                .chain(std::iter::once(Err(SiftError::Walk("disk went away".into()))))
                .chain(std::iter::once(Ok(after)));
            Box::new(items)
        }
    }

    #[test]
    fn walk_keeps_entries_before_an_error() {
        let ctx = RunContext::new();
        let mut walk = FailsAfter(3).walk(Path::new("r"), &ctx);

        let got = names(walk.by_ref());
        assert_eq!(got, vec!["0.mp3", "1.mp3", "2.mp3"]);
        assert!(walk.next().is_none());
        assert!(matches!(walk.finish(), Err(SiftError::Walk(_))));
        assert_eq!(ctx.metrics().snapshot().entry_count, 3);
    }

    #[test]
    fn listing_continues_after_nested_walk_fails() {
        let dir = setup();
        let root = dir.path();
        let listing = format!(
            "{}\n{}\n",
            root.join("sub").display(),
            root.join("a.mp3").display(),
        );
        let source = ListingSource::new(Cursor::new(listing)).expand_with(FailsAfter(1));
        let ctx = RunContext::new();
        let mut walk = source.walk(Path::new("-"), &ctx);

        let got = names(walk.by_ref());
        assert_eq!(got, vec!["0.mp3", "a.mp3"]);
        assert!(walk.finish().is_ok());
    }

    #[test]
    fn listing_accepts_crlf_and_blank_lines() {
        let dir = setup();
        let listing = format!("\r\n{}\r\n\n", dir.path().join("a.mp3").display());
        let ctx = RunContext::new();
        let mut walk = ListingSource::new(Cursor::new(listing)).walk(Path::new("-"), &ctx);

        assert_eq!(names(walk.by_ref()), vec!["a.mp3"]);
        assert!(walk.finish().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn listing_reads_non_utf8_names() {
        use std::os::unix::ffi::OsStrExt;

        let dir = setup();
        let latin1 = dir.path().join(std::ffi::OsStr::from_bytes(b"caf\xe9.mp3"));
        fs::write(&latin1, "x").unwrap();

        let mut listing = latin1.as_os_str().as_bytes().to_vec();
        listing.push(b'\n');
        listing.extend_from_slice(dir.path().join("b.mp3").as_os_str().as_bytes());
        listing.push(b'\n');

        let ctx = RunContext::new();
        let mut walk = ListingSource::new(Cursor::new(listing)).walk(Path::new("-"), &ctx);
        let paths: Vec<PathBuf> = walk.by_ref().map(|e| e.path).collect();

        assert_eq!(paths, vec![latin1, dir.path().join("b.mp3")]);
        assert!(walk.finish().is_ok());
    }

    #[test]
    fn cancelled_walk_yields_nothing() {
        let dir = setup();
        let ctx = RunContext::new();
        ctx.cancel();

        let mut walk = TreeSource.walk(dir.path(), &ctx);
        assert!(walk.next().is_none());
        assert!(walk.finish().is_ok());
    }

    #[test]
    fn listing_skips_missing_and_expands_directories() {
        let dir = setup();
        let root = dir.path();
        let listing = format!(
            "{}\n{}\n{}\n",
            root.join("b.mp3").display(),
            root.join("missing.mp3").display(),
            root.join("sub").display(),
        );
        let source = ListingSource::new(Cursor::new(listing));
        let ctx = RunContext::new();
        let mut walk = source.walk(Path::new("-"), &ctx);

        let got = names(walk.by_ref());
        assert_eq!(got, vec!["b.mp3", "c.flac"]);
        assert!(walk.finish().is_ok());
        assert_eq!(ctx.metrics().snapshot().entry_count, 2);
    }

    #[test]
    fn listing_is_consumed_once() {
        let dir = setup();
        let source = ListingSource::new(Cursor::new(format!(
            "{}\n",
            dir.path().join("a.mp3").display()
        )));
        let ctx = RunContext::new();

        assert_eq!(source.walk(Path::new("-"), &ctx).count(), 1);
        assert_eq!(source.walk(Path::new("-"), &ctx).count(), 0);
    }
}
