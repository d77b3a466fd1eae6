//! Site naming and the paths derived from it.

use crate::config::ProvisionConfig;
use crate::errors::ProvisionError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Longest accepted site name.
pub const MAX_SITE_NAME_LEN: usize = 63;

/// A validated site name: lowercase ASCII letters, digits and `-`, starting
/// with a letter or digit, at most 63 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SiteName(String);

impl SiteName {
    /// Validates a site name.
    pub fn new(name: &str) -> Result<Self, ProvisionError> {
        let mut chars = name.chars();
        let valid_first = chars
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if valid_first && valid_rest && name.len() <= MAX_SITE_NAME_LEN {
            Ok(Self(name.to_string()))
        } else {
            Err(ProvisionError::Usage(format!(
                "invalid site name '{name}': use lowercase letters, digits and '-', \
                 starting with a letter or digit, at most {MAX_SITE_NAME_LEN} characters"
            )))
        }
    }

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Database and database user name: `wp_<site>` with `-` replaced by `_`.
    #[must_use]
    pub fn db_name(&self) -> String {
        format!("wp_{}", self.0.replace('-', "_"))
    }

    /// Server name, the site name plus the configured suffix.
    #[must_use]
    pub fn domain(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.0)
    }
}

impl fmt::Display for SiteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SiteName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Every filesystem location a run touches for one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SitePaths {
    /// Document root.
    pub site_dir: PathBuf,
    /// `wp-config.php` inside the document root.
    pub wp_config: PathBuf,
    /// Server block in `sites-available`.
    pub nginx_available: PathBuf,
    /// Symlink in `sites-enabled`.
    pub nginx_enabled: PathBuf,
    /// The tuned `php.ini`.
    pub php_ini: PathBuf,
    /// Site backups.
    pub backup_dir: PathBuf,
    /// Config file snapshots.
    pub snapshot_dir: PathBuf,
    /// Run logs.
    pub log_dir: PathBuf,
}

impl SitePaths {
    /// Resolves paths for `site` under the configured roots.
    #[must_use]
    pub fn resolve(config: &ProvisionConfig, site: &SiteName) -> Self {
        let paths = &config.paths;
        let site_dir = paths.web_root.join(site.as_str());
        let conf = format!("{site}.conf");
        Self {
            wp_config: site_dir.join("wp-config.php"),
            site_dir,
            nginx_available: paths.nginx_sites_available.join(&conf),
            nginx_enabled: paths.nginx_sites_enabled.join(&conf),
            php_ini: paths.php_ini.clone(),
            backup_dir: paths.backup_dir.join(site.as_str()),
            snapshot_dir: paths.backup_dir.join("config"),
            log_dir: paths.log_dir.clone(),
        }
    }
}
