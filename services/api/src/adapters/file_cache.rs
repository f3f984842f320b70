//! services/api/src/adapters/file_cache.rs
//!
//! A `LocalCache` backed by one JSON file per key in a directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use training_portal_core::ports::{LocalCache, PortError, PortResult};

#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
    max_bytes: usize,
}

impl FileCache {
    /// Creates the cache directory if needed.
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, max_bytes })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file))
    }
}

fn io_error(path: &Path, e: std::io::Error) -> PortError {
    PortError::Unexpected(format!("{}: {}", path.display(), e))
}

impl LocalCache for FileCache {
    /// Writes through a temp file and a rename so a crash never leaves half a snapshot.
    fn save(&self, key: &str, snapshot: &str) -> PortResult<()> {
        if snapshot.len() > self.max_bytes {
            return Err(PortError::QuotaExceeded {
                needed: snapshot.len(),
                limit: self.max_bytes,
            });
        }
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, snapshot).map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))
    }

    fn load(&self, key: &str) -> PortResult<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    fn remove(&self, key: &str) -> PortResult<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}
