use std::fs::Metadata;
use std::path::PathBuf;
use std::time::SystemTime;

/// A single file produced by a [`Source`](crate::source::Source) during traversal.
///
/// Created once per discovered file and consumed once by the probe stage.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Path to the file, as the source discovered it.
    pub path: PathBuf,

    /// Stat attributes captured at discovery time.
    pub info: FileInfo,
}

/// The stat-like attributes of an [`Entry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Size in bytes.
    pub size: u64,

    /// Permission bits (`0o7777` mask on unix).
    pub mode: u32,

    /// Last modification time.
    pub modified: SystemTime,

    pub is_dir: bool,
}

impl Entry {
    pub fn new(path: impl Into<PathBuf>, info: FileInfo) -> Self {
        Self { path: path.into(), info }
    }

    /// The entry's file name, or the whole path when it has none.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

impl From<&Metadata> for FileInfo {
    fn from(md: &Metadata) -> Self {
        Self {
            size:     md.len(),
            mode:     permission_bits(md),
            modified: md.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            is_dir:   md.is_dir(),
        }
    }
}

#[cfg(unix)]
fn permission_bits(md: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    md.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(md: &Metadata) -> u32 {
    if md.permissions().readonly() { 0o444 } else { 0o644 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_from_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.mp3");
        std::fs::write(&file, b"12345").unwrap();

        let info = FileInfo::from(&std::fs::metadata(&file).unwrap());
        assert_eq!(info.size, 5);
        assert!(!info.is_dir);
        assert!(info.mode & 0o400 != 0, "owner should be able to read");

        let entry = Entry::new(&file, info);
        assert_eq!(entry.name(), "a.mp3");
    }
}
