//! WP-CLI invocations.
//!
//! Secrets are passed with `--prompt=<field>` on stdin rather than as flags.

use super::{CommandSpec, Stdin};
use std::path::{Path, PathBuf};

/// WP-CLI bound to one WordPress installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WpCli {
    path: PathBuf,
}

impl WpCli {
    /// Targets the installation in `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The installation directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `wp <args> --path=<dir>`.
    #[must_use]
    pub fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new("wp")
            .args(args)
            .arg(format!("--path={}", self.path.display()))
    }

    /// Downloads WordPress core.
    #[must_use]
    pub fn core_download(&self, locale: &str) -> CommandSpec {
        self.command(["core", "download"])
            .arg(format!("--locale={locale}"))
    }

    /// Writes `wp-config.php`; the database password is read from stdin.
    #[must_use]
    pub fn config_create(
        &self,
        db_name: &str,
        db_user: &str,
        db_host: &str,
        db_password: &str,
    ) -> CommandSpec {
        self.command(["config", "create"])
            .arg(format!("--dbname={db_name}"))
            .arg(format!("--dbuser={db_user}"))
            .arg(format!("--dbhost={db_host}"))
            .arg("--prompt=dbpass")
            .stdin(Stdin::Text(format!("{db_password}\n")))
    }

    /// Runs the installer; the admin password is read from stdin.
    #[must_use]
    pub fn core_install(
        &self,
        url: &str,
        title: &str,
        admin_user: &str,
        admin_email: &str,
        admin_password: &str,
    ) -> CommandSpec {
        self.command(["core", "install"])
            .arg(format!("--url={url}"))
            .arg(format!("--title={title}"))
            .arg(format!("--admin_user={admin_user}"))
            .arg(format!("--admin_email={admin_email}"))
            .arg("--skip-email")
            .arg("--prompt=admin_password")
            .stdin(Stdin::Text(format!("{admin_password}\n")))
    }

    /// Exits zero when WordPress is installed.
    #[must_use]
    pub fn core_is_installed(&self) -> CommandSpec {
        self.command(["core", "is-installed"])
    }

    /// Prints the installed core version.
    #[must_use]
    pub fn core_version(&self) -> CommandSpec {
        self.command(["core", "version"])
    }

    /// Prints one `wp-config.php` constant.
    #[must_use]
    pub fn config_get(&self, name: &str) -> CommandSpec {
        self.command(["config", "get", name])
    }

    /// Installs and activates a plugin.
    #[must_use]
    pub fn plugin_install(&self, plugin: &str) -> CommandSpec {
        self.command(["plugin", "install", plugin, "--activate"])
    }

    /// Installs a theme, activating it when asked.
    #[must_use]
    pub fn theme_install(&self, theme: &str, activate: bool) -> CommandSpec {
        let cmd = self.command(["theme", "install", theme]);
        if activate {
            cmd.arg("--activate")
        } else {
            cmd
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_commands_carry_path() {
        let wp = WpCli::new("/srv/http/blog");
        assert_eq!(
            wp.core_download("en_US").to_string(),
            "wp core download --path=/srv/http/blog --locale=en_US"
        );
        assert_eq!(
            wp.plugin_install("akismet").to_string(),
            "wp plugin install akismet --activate --path=/srv/http/blog"
        );
    }

    #[test]
    fn test_secrets_on_stdin() {
        let wp = WpCli::new("/srv/http/blog");
        let cmd = wp.config_create("wp_blog", "wp_blog", "localhost", "hunter2");
        assert!(!cmd.to_string().contains("hunter2"));
        assert_eq!(cmd.stdin, Stdin::Text("hunter2\n".into()));

        let cmd = wp.core_install("http://blog.local", "My Blog", "admin", "a@b.c", "pw");
        assert!(!cmd.to_string().contains(" pw"));
        assert!(cmd.mentions("--title=My Blog"));
    }
}
