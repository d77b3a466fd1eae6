//! Timestamped backups with a fixed retention count.
//!
//! Two stores share the same rule: entries are named after their creation
//! time, sort oldest first, and everything beyond the newest N is pruned.

mod site;
mod snapshots;

pub use site::{
    BackupEntry, Manifest, ManifestFile, SiteBackups, DATABASE_DUMP, FILES_ARCHIVE, MANIFEST,
};
pub use snapshots::ConfigSnapshots;

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// SHA-256 of a file, hex encoded.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Deletes all but the newest `retention` entries.
///
/// `entries` must be sorted oldest first. Returns the removed paths; entries
/// that fail to delete are logged and kept out of the result.
pub fn prune_oldest(entries: &[PathBuf], retention: usize) -> Vec<PathBuf> {
    let excess = entries.len().saturating_sub(retention);
    let mut removed = Vec::with_capacity(excess);
    for path in &entries[..excess] {
        let result = if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        match result {
            Ok(()) => {
                debug!(path = %path.display(), "Pruned old backup");
                removed.push(path.clone());
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to prune backup"),
        }
    }
    removed
}
