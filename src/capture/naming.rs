//! Output file naming
//!
//! Files are named `<prefix>_<YYYYmmdd_HHMMSS>.<ext>`. Two requests inside
//! the same second would collide, so a numeric suffix (`_1`, `_2`, ...) is
//! appended when the plain name is already taken on disk or was handed out
//! last time.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Timestamp format used in file names
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Hands out unique timestamped paths inside one directory
#[derive(Debug, Clone)]
pub struct PathAllocator {
    dir: PathBuf,
    last: Option<PathBuf>,
}

impl PathAllocator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            last: None,
        }
    }

    /// Allocate a path for the current local time
    pub fn allocate(&mut self, prefix: &str, ext: &str) -> PathBuf {
        self.allocate_at(prefix, ext, Local::now())
    }

    /// Allocate a path for the given time
    pub fn allocate_at(&mut self, prefix: &str, ext: &str, at: DateTime<Local>) -> PathBuf {
        let stamp = at.format(TIMESTAMP_FORMAT);
        let mut path = self.dir.join(format!("{}_{}.{}", prefix, stamp, ext));
        let mut n = 1u32;

        while self.is_taken(&path) {
            path = self.dir.join(format!("{}_{}_{}.{}", prefix, stamp, n, ext));
            n += 1;
        }

        self.last = Some(path.clone());
        path
    }

    fn is_taken(&self, path: &Path) -> bool {
        self.last.as_deref() == Some(path) || path.exists()
    }
}
