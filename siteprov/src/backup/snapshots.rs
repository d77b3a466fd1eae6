//! Copies of configuration files taken before they are edited.

use super::prune_oldest;
use crate::errors::ProvisionError;
use crate::utils::{file_stamp, now_utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Keeps `<file name>.<stamp>.bak` copies of edited files in one directory.
#[derive(Debug, Clone)]
pub struct ConfigSnapshots {
    dir: PathBuf,
    retention: usize,
}

impl ConfigSnapshots {
    /// Creates a store in `dir` keeping `retention` copies per file.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, retention: usize) -> Self {
        Self {
            dir: dir.into(),
            retention,
        }
    }

    /// The store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copies `path` into the store and prunes older copies of it.
    ///
    /// Returns `None` when `path` does not exist.
    pub fn snapshot_file(&self, path: &Path) -> Result<Option<PathBuf>, ProvisionError> {
        if !path.exists() {
            return Ok(None);
        }
        fs::create_dir_all(&self.dir)?;

        let name = file_name(path)?;
        let stem = format!("{name}.{}", file_stamp(now_utc()));
        let mut target = self.dir.join(format!("{stem}.bak"));
        let mut counter = 1;
        while target.exists() {
            target = self.dir.join(format!("{stem}-{counter}.bak"));
            counter += 1;
        }

        fs::copy(path, &target)?;
        debug!(source = %path.display(), snapshot = %target.display(), "Config snapshot taken");
        prune_oldest(&self.snapshots_of(path)?, self.retention);
        Ok(Some(target))
    }

    /// Snapshots of `path`, oldest first.
    pub fn snapshots_of(&self, path: &Path) -> Result<Vec<PathBuf>, ProvisionError> {
        let prefix = format!("{}.", file_name(path)?);
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut found: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".bak"))
            })
            .collect();
        found.sort();
        Ok(found)
    }
}

fn file_name(path: &Path) -> Result<String, ProvisionError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            ProvisionError::step("snapshot", format!("'{}' has no file name", path.display()))
        })
}
