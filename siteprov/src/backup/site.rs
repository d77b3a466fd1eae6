//! Full site backups: database dump, files archive and checksum manifest.

use super::{prune_oldest, sha256_file};
use crate::errors::ProvisionError;
use crate::utils::{file_stamp, iso_timestamp, parse_file_stamp, Timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Database dump file name inside a backup.
pub const DATABASE_DUMP: &str = "database.sql";
/// Files archive name inside a backup.
pub const FILES_ARCHIVE: &str = "files.tar.gz";
/// Manifest file name inside a backup.
pub const MANIFEST: &str = "manifest.json";

/// One artefact listed in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// File name relative to the backup directory.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Hex SHA-256.
    pub sha256: String,
}

/// Describes the contents of one backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest format version.
    pub version: u32,
    /// Site the backup belongs to.
    pub site: String,
    /// Database that was dumped.
    pub database: String,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// Checksummed artefacts.
    pub files: Vec<ManifestFile>,
}

impl Manifest {
    /// Builds a manifest by checksumming `names` inside `dir`.
    pub fn build(
        dir: &Path,
        site: &str,
        database: &str,
        names: &[&str],
    ) -> Result<Self, ProvisionError> {
        let files = names
            .iter()
            .map(|name| {
                let path = dir.join(name);
                Ok(ManifestFile {
                    name: (*name).to_string(),
                    size: fs::metadata(&path)?.len(),
                    sha256: sha256_file(&path)?,
                })
            })
            .collect::<Result<Vec<_>, std::io::Error>>()?;
        Ok(Self {
            version: 1,
            site: site.to_string(),
            database: database.to_string(),
            created_at: iso_timestamp(),
            files,
        })
    }

    /// Writes the manifest as pretty JSON into `dir`.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, ProvisionError> {
        let path = dir.join(MANIFEST);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    /// Reads the manifest from `dir`.
    pub fn read(dir: &Path) -> Result<Self, ProvisionError> {
        let content = fs::read_to_string(dir.join(MANIFEST))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Recomputes every checksum, failing on the first mismatch.
    pub fn verify(&self, dir: &Path) -> Result<(), ProvisionError> {
        for file in &self.files {
            let path = dir.join(&file.name);
            if !path.exists() {
                return Err(ProvisionError::step(
                    "verify-backup",
                    format!("'{}' is missing from {}", file.name, dir.display()),
                ));
            }
            let actual = sha256_file(&path)?;
            if actual != file.sha256 {
                return Err(ProvisionError::step(
                    "verify-backup",
                    format!(
                        "checksum mismatch for '{}': expected {}, found {actual}",
                        file.name, file.sha256
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Returns true if the manifest lists `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.files.iter().any(|f| f.name == name)
    }
}

/// A backup directory found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupEntry {
    /// Directory name, the creation stamp.
    pub name: String,
    /// Full path.
    pub path: PathBuf,
    /// Creation time parsed from the name.
    pub created_at: Option<Timestamp>,
}

/// Backups of one site, one stamped directory each.
#[derive(Debug, Clone)]
pub struct SiteBackups {
    root: PathBuf,
    retention: usize,
}

impl SiteBackups {
    /// Creates a store rooted at the site's backup directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, retention: usize) -> Self {
        Self {
            root: root.into(),
            retention,
        }
    }

    /// The site's backup directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a new backup directory stamped with `at`, not yet created.
    #[must_use]
    pub fn next_dir(&self, at: DateTime<Utc>) -> PathBuf {
        let stem = file_stamp(at);
        let mut path = self.root.join(&stem);
        let mut counter = 1;
        while path.exists() {
            path = self.root.join(format!("{stem}-{counter}"));
            counter += 1;
        }
        path
    }

    /// Complete backups (those with a manifest), oldest first.
    pub fn list(&self) -> Result<Vec<BackupEntry>, ProvisionError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut found: Vec<BackupEntry> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_dir() && p.join(MANIFEST).is_file())
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?.to_string();
                Some(BackupEntry {
                    created_at: parse_file_stamp(&name),
                    name,
                    path,
                })
            })
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    /// The newest complete backup.
    pub fn latest(&self) -> Result<Option<BackupEntry>, ProvisionError> {
        Ok(self.list()?.pop())
    }

    /// A complete backup by directory name.
    pub fn find(&self, name: &str) -> Result<Option<BackupEntry>, ProvisionError> {
        Ok(self.list()?.into_iter().find(|b| b.name == name))
    }

    /// Deletes complete backups beyond the retention count.
    pub fn prune(&self) -> Result<Vec<PathBuf>, ProvisionError> {
        let paths: Vec<PathBuf> = self.list()?.into_iter().map(|b| b.path).collect();
        Ok(prune_oldest(&paths, self.retention))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn fake_backup(store: &SiteBackups, second: u32) -> PathBuf {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, second).unwrap();
        let dir = store.next_dir(at);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(DATABASE_DUMP), format!("-- dump {second}")).unwrap();
        Manifest::build(&dir, "blog", "wp_blog", &[DATABASE_DUMP])
            .unwrap()
            .write(&dir)
            .unwrap();
        dir
    }

    #[test]
    fn test_manifest_verify() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(DATABASE_DUMP), "-- dump").unwrap();
        fs::write(dir.path().join(FILES_ARCHIVE), "tar").unwrap();

        let files = [DATABASE_DUMP, FILES_ARCHIVE];
        let manifest = Manifest::build(dir.path(), "blog", "wp_blog", &files).unwrap();
        manifest.write(dir.path()).unwrap();

        let read = Manifest::read(dir.path()).unwrap();
        assert_eq!(read, manifest);
        assert!(read.contains(FILES_ARCHIVE));
        assert!(read.verify(dir.path()).is_ok());

        fs::write(dir.path().join(DATABASE_DUMP), "-- tampered").unwrap();
        let err = read.verify(dir.path()).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));

        fs::remove_file(dir.path().join(FILES_ARCHIVE)).unwrap();
        let err = read.verify(dir.path()).unwrap_err();
        assert!(err.to_string().contains("missing") || err.to_string().contains("mismatch"));
    }

    #[test]
    fn test_list_ignores_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let store = SiteBackups::new(dir.path().join("blog"), 5);
        assert!(store.list().unwrap().is_empty());

        let complete = fake_backup(&store, 1);
        fs::create_dir_all(store.root().join("20260301-120005.000")).unwrap();

        let list = store.list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].path, complete);
        assert!(list[0].created_at.is_some());
    }

    #[test]
    fn test_latest_and_find() {
        let dir = tempfile::tempdir().unwrap();
        let store = SiteBackups::new(dir.path().join("blog"), 5);
        fake_backup(&store, 1);
        let newest = fake_backup(&store, 2);

        let latest = store.latest().unwrap().unwrap();
        assert_eq!(latest.path, newest);
        assert_eq!(store.find(&latest.name).unwrap().unwrap().path, newest);
        assert!(store.find("19990101-000000.000").unwrap().is_none());
    }

    #[test]
    fn test_prune() {
        let dir = tempfile::tempdir().unwrap();
        let store = SiteBackups::new(dir.path().join("blog"), 2);
        let dirs: Vec<PathBuf> = (1..=4).map(|s| fake_backup(&store, s)).collect();

        let removed = store.prune().unwrap();
        assert_eq!(removed, dirs[..2].to_vec());
        assert_eq!(store.list().unwrap().len(), 2);
    }
}
