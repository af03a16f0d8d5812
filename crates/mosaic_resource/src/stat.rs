//! File fingerprints and the stat seam
//!
//! The tracker never subscribes to filesystem events; it polls a [`FileStat`]
//! implementation. [`StdFileStat`] asks the OS, [`MemoryFileStat`] serves
//! fingerprints from a shared table for tests and tools.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// The (size, modification time, creation time) triple used to detect change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Fingerprint {
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub created: Option<SystemTime>,
}

/// Which fingerprint field changed first, in comparison priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintChange {
    Size,
    ModTime,
    CreateTime,
}

impl fmt::Display for FingerprintChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Size => write!(f, "File Size Changed"),
            Self::ModTime => write!(f, "File Modification Time Changed"),
            Self::CreateTime => write!(f, "File Creation Time Changed"),
        }
    }
}

impl Fingerprint {
    pub fn new(size: u64, modified: Option<SystemTime>, created: Option<SystemTime>) -> Self {
        Self {
            size,
            modified,
            created,
        }
    }

    /// First differing field: size, then modification time, then creation time
    pub fn first_change(&self, current: &Fingerprint) -> Option<FingerprintChange> {
        if self.size != current.size {
            Some(FingerprintChange::Size)
        } else if self.modified != current.modified {
            Some(FingerprintChange::ModTime)
        } else if self.created != current.created {
            Some(FingerprintChange::CreateTime)
        } else {
            None
        }
    }
}

/// Source of file fingerprints
pub trait FileStat {
    fn stat(&self, path: &Path) -> io::Result<Fingerprint>;
}

/// Fingerprints from the real filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileStat;

impl FileStat for StdFileStat {
    fn stat(&self, path: &Path) -> io::Result<Fingerprint> {
        let metadata = std::fs::metadata(path)?;
        Ok(Fingerprint {
            size: metadata.len(),
            modified: metadata.modified().ok(),
            created: created_time(&metadata),
        })
    }
}

// Unix has no portable birth time; the inode change time plays that role
#[cfg(unix)]
fn created_time(metadata: &std::fs::Metadata) -> Option<SystemTime> {
    use std::os::unix::fs::MetadataExt;
    use std::time::Duration;

    let secs = metadata.ctime();
    let nanos = metadata.ctime_nsec().clamp(0, 999_999_999) as u32;
    if secs >= 0 {
        SystemTime::UNIX_EPOCH.checked_add(Duration::new(secs as u64, nanos))
    } else {
        SystemTime::UNIX_EPOCH.checked_sub(Duration::new(secs.unsigned_abs(), 0))
    }
}

#[cfg(not(unix))]
fn created_time(metadata: &std::fs::Metadata) -> Option<SystemTime> {
    metadata.created().ok()
}

/// In-memory fingerprints; clones share one table
#[derive(Debug, Default, Clone)]
pub struct MemoryFileStat {
    files: Arc<RwLock<HashMap<PathBuf, Fingerprint>>>,
}

impl MemoryFileStat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a file's fingerprint
    pub fn set(&self, path: impl Into<PathBuf>, fingerprint: Fingerprint) {
        self.files.write().insert(path.into(), fingerprint);
    }

    /// Change only the size of an existing file
    pub fn set_size(&self, path: impl AsRef<Path>, size: u64) {
        if let Some(fp) = self.files.write().get_mut(path.as_ref()) {
            fp.size = size;
        }
    }

    /// Bump the modification time of an existing file by one second
    pub fn touch(&self, path: impl AsRef<Path>) {
        if let Some(fp) = self.files.write().get_mut(path.as_ref()) {
            let base = fp.modified.unwrap_or(SystemTime::UNIX_EPOCH);
            fp.modified = Some(base + std::time::Duration::from_secs(1));
        }
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        self.files.write().remove(path.as_ref());
    }
}

impl FileStat for MemoryFileStat {
    fn stat(&self, path: &Path) -> io::Result<Fingerprint> {
        self.files.read().get(path).copied().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{}: no such file", path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_change_priority() {
        let t0 = SystemTime::UNIX_EPOCH;
        let t1 = t0 + Duration::from_secs(5);
        let base = Fingerprint::new(10, Some(t0), Some(t0));

        assert_eq!(base.first_change(&base), None);
        assert_eq!(
            base.first_change(&Fingerprint::new(11, Some(t1), Some(t1))),
            Some(FingerprintChange::Size)
        );
        assert_eq!(
            base.first_change(&Fingerprint::new(10, Some(t1), Some(t1))),
            Some(FingerprintChange::ModTime)
        );
        assert_eq!(
            base.first_change(&Fingerprint::new(10, Some(t0), Some(t1))),
            Some(FingerprintChange::CreateTime)
        );
    }

    #[test]
    fn test_std_stat_reads_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.obj");
        std::fs::write(&path, b"v 0 0 0\n").unwrap();

        let fp = StdFileStat.stat(&path).unwrap();
        assert_eq!(fp.size, 8);
        assert!(fp.modified.is_some());
        assert!(StdFileStat.stat(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_memory_stat_shares_state_between_clones() {
        let stat = MemoryFileStat::new();
        let view = stat.clone();
        stat.set("a.png", Fingerprint::new(1, None, None));

        stat.set_size("a.png", 2);
        assert_eq!(view.stat(Path::new("a.png")).unwrap().size, 2);

        stat.remove("a.png");
        assert_eq!(
            view.stat(Path::new("a.png")).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }
}
