use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SiftError {
    // Traversal
    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("symlink loop: {}", .0.display())]
    SymlinkLoop(PathBuf),

    #[error("IO error at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("walk error: {0}")]
    Walk(String),

    // Config
    #[error("invalid config: {0}")]
    Config(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid pattern in query {query}")]
    InvalidPattern {
        query: String,
        #[source]
        source: regex::Error,
    },

    // Probe
    #[error("probe failed for {}: {reason}", path.display())]
    Probe { path: PathBuf, reason: String },

    // Runtime
    #[error("cancelled")]
    Cancelled,

    #[error("thread pool failure: {0}")]
    ThreadPool(String),

    #[error("output error")]
    Output(#[source] std::io::Error),
}

impl SiftError {
    /// The path this error occurred at, if applicable.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::PermissionDenied(p)
            | Self::NotFound(p)
            | Self::SymlinkLoop(p)
            | Self::Io { path: p, .. }
            | Self::Probe { path: p, .. } => Some(p),
            _ => None,
        }
    }

    /// Whether the run can continue after this error.
    ///
    /// Probe and output failures degrade a single record; configuration errors
    /// and thread pool failures stop the run before it starts.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_)
                | Self::NotFound(_)
                | Self::SymlinkLoop(_)
                | Self::Io { .. }
                | Self::Walk(_)
                | Self::Probe { .. }
                | Self::Output(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Wrap an IO error, classifying permission and not-found failures.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            _ => Self::Io { path, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified() {
        let denied = SiftError::io(
            "/x",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(denied, SiftError::PermissionDenied(_)));

        let missing = SiftError::io("/y", std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(matches!(missing, SiftError::NotFound(_)));
        assert_eq!(missing.path(), Some(&PathBuf::from("/y")));

        let other = SiftError::io("/z", std::io::Error::other("boom"));
        assert!(matches!(other, SiftError::Io { .. }));
        assert!(other.is_recoverable());
    }

    #[test]
    fn config_errors_are_fatal() {
        assert!(!SiftError::Config("no root".into()).is_recoverable());
        assert!(!SiftError::InvalidQuery("x".into()).is_recoverable());
        assert!(SiftError::Cancelled.is_cancelled());
    }
}
