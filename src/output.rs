use std::io::{self, Write};
use std::sync::Arc;

use crate::context::RunContext;
use crate::error::SiftError;
use crate::record::Record;
use crate::selector::Selector;

/// Applies the selector to each record and prints the accepted ones.
///
/// Non-verbose output is the `path` field, one per line. Verbose output is
/// the whole record as one JSON object per line, which is also the index
/// format that replay reads back.
pub struct Writer<W: Write> {
    out:           W,
    selector:      Arc<dyn Selector>,
    verbose:       bool,
    collect_paths: bool,
    paths:         Vec<String>,
}

impl<W: Write> Writer<W> {
    pub fn new(out: W, selector: Arc<dyn Selector>, verbose: bool) -> Self {
        Self {
            out,
            selector,
            verbose,
            collect_paths: false,
            paths: Vec::new(),
        }
    }

    /// Keep the `path` of every accepted record.
    pub fn collect_paths(mut self, yes: bool) -> Self {
        self.collect_paths = yes;
        self
    }

    /// Select and print `record`. Returns whether it was accepted.
    ///
    /// A record counts as accepted (in the metrics and in the collected
    /// paths) only once it has been written. A write error leaves it
    /// uncounted.
    pub fn write(&mut self, ctx: &RunContext, record: &Record) -> Result<bool, SiftError> {
        if !self.selector.select(ctx, record) {
            return Ok(false);
        }

        let path = record.get("path").unwrap_or_default();
        if self.verbose {
            let line = record.to_json().map_err(|e| SiftError::Output(io::Error::other(e)))?;
            writeln!(self.out, "{}", line).map_err(SiftError::Output)?;
        } else {
            writeln!(self.out, "{}", path).map_err(SiftError::Output)?;
        }

        ctx.metrics().accepted();
        if self.collect_paths {
            self.paths.push(path.to_string());
        }
        Ok(true)
    }

    pub fn flush(&mut self) -> Result<(), SiftError> {
        self.out.flush().map_err(SiftError::Output)
    }

    /// Consume the writer and return the collected paths.
    pub fn into_paths(self) -> Vec<String> {
        self.paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::{AndSelector, RegexSelector};

    fn record(path: &str) -> Record {
        [("path", path), ("name", path)].into_iter().collect()
    }

    #[test]
    fn prints_paths_of_accepted_records() {
        let ctx = RunContext::new();
        let selector = Arc::new(RegexSelector::new("name", "a").unwrap());
        let mut w = Writer::new(Vec::new(), selector, false).collect_paths(true);

        assert!(w.write(&ctx, &record("a.mp3")).unwrap());
        assert!(!w.write(&ctx, &record("b.mp3")).unwrap());

        assert_eq!(String::from_utf8(w.out.clone()).unwrap(), "a.mp3\n");
        assert_eq!(w.into_paths(), vec!["a.mp3"]);
        assert_eq!(ctx.metrics().snapshot().accept_count, 1);
    }

    #[test]
    fn verbose_prints_json_lines() {
        let ctx = RunContext::new();
        let mut w = Writer::new(Vec::new(), Arc::new(AndSelector::default()), true);
        w.write(&ctx, &record("a.mp3")).unwrap();

        let out = String::from_utf8(w.out).unwrap();
        assert_eq!(out, "{\"name\":\"a.mp3\",\"path\":\"a.mp3\"}\n");
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_errors_surface_as_output_errors() {
        let ctx = RunContext::new();
        let mut w = Writer::new(Broken, Arc::new(AndSelector::default()), false).collect_paths(true);
        assert!(matches!(w.write(&ctx, &record("a.mp3")), Err(SiftError::Output(_))));

        assert_eq!(ctx.metrics().snapshot().accept_count, 0);
        assert!(w.into_paths().is_empty());
    }
}
