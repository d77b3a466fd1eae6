//! Configuration for provisioning runs.
//!
//! Loaded from TOML. Every key has a default, so an absent file is the same
//! as an empty one:
//!
//! ```toml
//! [paths]
//! web_root = "/srv/http"
//!
//! [database]
//! admin_user = "root"
//!
//! [site]
//! plugins = ["classic-editor"]
//!
//! [steps]
//! optional = ["tune-php"]
//! ```

use crate::errors::ConfigError;
use crate::steps::StepPolicy;
use crate::system::PackageManager;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisionConfig {
    /// Filesystem locations.
    pub paths: PathsConfig,
    /// Database server access.
    pub database: DatabaseConfig,
    /// Package installation.
    pub packages: PackagesConfig,
    /// systemd unit names.
    pub services: ServicesConfig,
    /// Backup retention.
    pub backups: BackupsConfig,
    /// WordPress site defaults.
    pub site: SiteConfig,
    /// php.ini settings applied on install.
    pub php: PhpConfig,
    /// Required/optional overrides per step name.
    pub steps: StepPolicy,
    /// Host integration.
    pub system: SystemConfig,
}

/// Filesystem locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// Parent directory of site document roots.
    #[serde(default = "default_web_root")]
    pub web_root: PathBuf,
    /// Nginx `sites-available` directory.
    #[serde(default = "default_sites_available")]
    pub nginx_sites_available: PathBuf,
    /// Nginx `sites-enabled` directory.
    #[serde(default = "default_sites_enabled")]
    pub nginx_sites_enabled: PathBuf,
    /// The `php.ini` tuned on install.
    #[serde(default = "default_php_ini")]
    pub php_ini: PathBuf,
    /// PHP-FPM socket the server block passes requests to.
    #[serde(default = "default_php_fpm_socket")]
    pub php_fpm_socket: PathBuf,
    /// Where run logs are written.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Where site backups and config snapshots are kept.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
}

fn default_web_root() -> PathBuf {
    PathBuf::from("/srv/http")
}

fn default_sites_available() -> PathBuf {
    PathBuf::from("/etc/nginx/sites-available")
}

fn default_sites_enabled() -> PathBuf {
    PathBuf::from("/etc/nginx/sites-enabled")
}

fn default_php_ini() -> PathBuf {
    PathBuf::from("/etc/php/php.ini")
}

fn default_php_fpm_socket() -> PathBuf {
    PathBuf::from("/run/php-fpm/php-fpm.sock")
}

fn default_log_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/state")))
        .unwrap_or_else(std::env::temp_dir)
        .join("siteprov")
        .join("logs")
}

fn default_backup_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/share")))
        .unwrap_or_else(std::env::temp_dir)
        .join("siteprov")
        .join("backups")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            web_root: default_web_root(),
            nginx_sites_available: default_sites_available(),
            nginx_sites_enabled: default_sites_enabled(),
            php_ini: default_php_ini(),
            php_fpm_socket: default_php_fpm_socket(),
            log_dir: default_log_dir(),
            backup_dir: default_backup_dir(),
        }
    }
}

/// Database server access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Server host.
    #[serde(default = "default_db_host")]
    pub host: String,
    /// Administrative account used to create and drop databases.
    #[serde(default = "default_admin_user")]
    pub admin_user: String,
    /// How many times a rejected password is asked for again.
    #[serde(default = "default_auth_attempts")]
    pub auth_attempts: u32,
    /// Client executable.
    #[serde(default = "default_client")]
    pub client: String,
    /// Dump executable.
    #[serde(default = "default_dump")]
    pub dump: String,
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_admin_user() -> String {
    "root".to_string()
}

const fn default_auth_attempts() -> u32 {
    3
}

fn default_client() -> String {
    "mariadb".to_string()
}

fn default_dump() -> String {
    "mariadb-dump".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            admin_user: default_admin_user(),
            auth_attempts: default_auth_attempts(),
            client: default_client(),
            dump: default_dump(),
        }
    }
}

/// Package installation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackagesConfig {
    /// Which package manager installs missing tools.
    pub manager: PackageManager,
    /// Install missing tools without asking.
    pub auto_install: bool,
}

/// systemd unit names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServicesConfig {
    /// HTTP server unit.
    pub nginx: String,
    /// PHP-FPM unit.
    pub php_fpm: String,
    /// Database server unit.
    pub database: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            nginx: "nginx".to_string(),
            php_fpm: "php-fpm".to_string(),
            database: "mariadb".to_string(),
        }
    }
}

/// Backup retention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackupsConfig {
    /// How many backups of each kind are kept.
    pub retention: usize,
}

impl Default for BackupsConfig {
    fn default() -> Self {
        Self { retention: 5 }
    }
}

/// WordPress site defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Appended to the site name to form the server name.
    pub domain_suffix: String,
    /// WordPress administrator login.
    pub admin_user: String,
    /// WordPress administrator e-mail.
    pub admin_email: String,
    /// WordPress locale passed to `wp core download`.
    pub locale: String,
    /// Plugins installed and activated after core install.
    pub plugins: Vec<String>,
    /// Themes installed after core install; the first one is activated.
    pub themes: Vec<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            domain_suffix: ".local".to_string(),
            admin_user: "admin".to_string(),
            admin_email: "admin@example.com".to_string(),
            locale: "en_US".to_string(),
            plugins: Vec::new(),
            themes: Vec::new(),
        }
    }
}

/// `php.ini` settings applied on install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PhpConfig {
    /// Key/value pairs written with `key = value`.
    pub settings: BTreeMap<String, String>,
}

impl Default for PhpConfig {
    fn default() -> Self {
        let settings = [
            ("upload_max_filesize", "64M"),
            ("post_max_size", "64M"),
            ("memory_limit", "256M"),
            ("max_execution_time", "300"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self { settings }
    }
}

/// Host integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SystemConfig {
    /// Prefix privileged commands with `sudo`.
    pub sudo: bool,
    /// User that owns site files.
    pub web_user: String,
    /// Group that owns site files.
    pub web_group: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            sudo: true,
            web_user: "http".to_string(),
            web_group: "http".to_string(),
        }
    }
}

impl ProvisionConfig {
    /// Location of the user configuration file.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("siteprov").join("config.toml"))
    }

    /// Loads configuration.
    ///
    /// An explicit path must exist. Without one, the user configuration file
    /// is read if present, and defaults are used otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) => match fs::read_to_string(&path) {
                    Ok(content) => Self::parse(&content, &path)?,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        debug!(path = %path.display(), "No config file, using defaults");
                        Self::default()
                    }
                    Err(source) => return Err(ConfigError::Read { path, source }),
                },
                None => Self::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a file without validating it.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parses TOML text and validates it.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config = Self::parse(content, Path::new("<inline>"))?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.message().to_string(),
        })
    }

    /// Rejects values no run could work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backups.retention == 0 {
            return Err(ConfigError::invalid("backups.retention", "must be at least 1"));
        }
        if self.database.auth_attempts == 0 {
            return Err(ConfigError::invalid("database.auth_attempts", "must be at least 1"));
        }
        let paths = [
            ("paths.web_root", &self.paths.web_root),
            ("paths.nginx_sites_available", &self.paths.nginx_sites_available),
            ("paths.nginx_sites_enabled", &self.paths.nginx_sites_enabled),
            ("paths.php_ini", &self.paths.php_ini),
            ("paths.log_dir", &self.paths.log_dir),
            ("paths.backup_dir", &self.paths.backup_dir),
        ];
        for (key, path) in paths {
            if !path.is_absolute() {
                return Err(ConfigError::invalid(
                    key,
                    format!("'{}' is not an absolute path", path.display()),
                ));
            }
        }
        self.steps.validate()
    }

    /// Replaces every path under `root`, keeping relative layout.
    ///
    /// Used to point a whole configuration at a scratch directory.
    #[must_use]
    pub fn rooted_at(mut self, root: &Path) -> Self {
        self.paths = PathsConfig {
            web_root: root.join("srv/http"),
            nginx_sites_available: root.join("etc/nginx/sites-available"),
            nginx_sites_enabled: root.join("etc/nginx/sites-enabled"),
            php_ini: root.join("etc/php/php.ini"),
            php_fpm_socket: root.join("run/php-fpm/php-fpm.sock"),
            log_dir: root.join("logs"),
            backup_dir: root.join("backups"),
        };
        self.system.sudo = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = ProvisionConfig::default();
        assert_eq!(config.paths.web_root, PathBuf::from("/srv/http"));
        assert_eq!(config.database.admin_user, "root");
        assert_eq!(config.database.auth_attempts, 3);
        assert_eq!(config.packages.manager, PackageManager::Pacman);
        assert!(!config.packages.auto_install);
        assert_eq!(config.backups.retention, 5);
        assert_eq!(config.site.domain_suffix, ".local");
        assert_eq!(config.php.settings.get("memory_limit").unwrap(), "256M");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ProvisionConfig::from_toml_str(
            r#"
            [paths]
            web_root = "/var/www"

            [packages]
            manager = "apt"

            [site]
            plugins = ["classic-editor"]

            [steps]
            optional = ["tune-php"]
            "#,
        )
        .unwrap();
        assert_eq!(config.paths.web_root, PathBuf::from("/var/www"));
        assert_eq!(config.paths.php_ini, PathBuf::from("/etc/php/php.ini"));
        assert_eq!(config.packages.manager, PackageManager::Apt);
        assert_eq!(config.site.plugins, vec!["classic-editor"]);
        assert_eq!(config.site.admin_email, "admin@example.com");
        assert!(!config.steps.resolve("tune-php", true));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = ProvisionConfig::from_toml_str("[paths]\nwebroot = \"/x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validation() {
        let err = ProvisionConfig::from_toml_str("[backups]\nretention = 0").unwrap_err();
        assert!(err.to_string().contains("backups.retention"));

        let err = ProvisionConfig::from_toml_str("[database]\nauth_attempts = 0").unwrap_err();
        assert!(err.to_string().contains("database.auth_attempts"));

        let err = ProvisionConfig::from_toml_str("[paths]\nweb_root = \"srv\"").unwrap_err();
        assert!(err.to_string().contains("paths.web_root"));

        let err = ProvisionConfig::from_toml_str(
            "[steps]\nrequired = [\"a\"]\noptional = [\"a\"]",
        )
        .unwrap_err();
        assert!(err.to_string().contains("both required and optional"));
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProvisionConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[backups]\nretention = 2\n").unwrap();
        let config = ProvisionConfig::load(Some(&path)).unwrap();
        assert_eq!(config.backups.retention, 2);
    }

    #[test]
    fn test_rooted_at() {
        let config = ProvisionConfig::default().rooted_at(Path::new("/tmp/x"));
        assert_eq!(config.paths.web_root, PathBuf::from("/tmp/x/srv/http"));
        assert!(!config.system.sudo);
        assert!(config.validate().is_ok());
    }
}
