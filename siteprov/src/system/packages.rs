//! Package manager front-ends and the tools a site depends on.

use super::{CommandRunner, CommandSpec};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported package managers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    /// Arch Linux.
    #[default]
    Pacman,
    /// Debian and derivatives.
    Apt,
    /// Fedora and derivatives.
    Dnf,
}

impl PackageManager {
    /// The command that installs `packages` non-interactively.
    #[must_use]
    pub fn install_command(self, packages: &[&str]) -> CommandSpec {
        let cmd = match self {
            Self::Pacman => CommandSpec::new("pacman").args(["-S", "--needed", "--noconfirm"]),
            Self::Apt => CommandSpec::new("apt-get").args(["install", "-y"]),
            Self::Dnf => CommandSpec::new("dnf").args(["install", "-y"]),
        };
        cmd.args(packages.iter().copied())
    }

    /// Package name providing `tool` on this distribution.
    #[must_use]
    pub fn package_for(self, dependency: &Dependency) -> &'static str {
        match self {
            Self::Pacman => dependency.pacman,
            Self::Apt => dependency.apt,
            Self::Dnf => dependency.dnf,
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pacman => write!(f, "pacman"),
            Self::Apt => write!(f, "apt"),
            Self::Dnf => write!(f, "dnf"),
        }
    }
}

/// An executable a workflow needs, with the package providing it per
/// distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    /// Executable looked up on `PATH`.
    pub tool: &'static str,
    /// Arch package.
    pub pacman: &'static str,
    /// Debian package.
    pub apt: &'static str,
    /// Fedora package.
    pub dnf: &'static str,
}

impl Dependency {
    const fn same(tool: &'static str, package: &'static str) -> Self {
        Self {
            tool,
            pacman: package,
            apt: package,
            dnf: package,
        }
    }

    /// Returns true if the tool is on `PATH`.
    pub fn is_present(&self, runner: &dyn CommandRunner) -> bool {
        runner.exists(self.tool)
    }
}

/// HTTP server.
pub const NGINX: Dependency = Dependency::same("nginx", "nginx");
/// PHP interpreter.
pub const PHP: Dependency = Dependency {
    tool: "php",
    pacman: "php",
    apt: "php-cli",
    dnf: "php-cli",
};
/// PHP FastCGI process manager.
pub const PHP_FPM: Dependency = Dependency {
    tool: "php-fpm",
    pacman: "php-fpm",
    apt: "php-fpm",
    dnf: "php-fpm",
};
/// Database client.
pub const MARIADB: Dependency = Dependency {
    tool: "mariadb",
    pacman: "mariadb",
    apt: "mariadb-client",
    dnf: "mariadb",
};
/// Database dump tool.
pub const MARIADB_DUMP: Dependency = Dependency {
    tool: "mariadb-dump",
    pacman: "mariadb-clients",
    apt: "mariadb-client",
    dnf: "mariadb",
};
/// WordPress command line.
pub const WP_CLI: Dependency = Dependency::same("wp", "wp-cli");
/// Archiver.
pub const TAR: Dependency = Dependency::same("tar", "tar");
/// Service manager.
pub const SYSTEMCTL: Dependency = Dependency::same("systemctl", "systemd");

/// Everything an install needs.
pub const INSTALL_DEPENDENCIES: &[Dependency] =
    &[NGINX, PHP, PHP_FPM, MARIADB, WP_CLI, SYSTEMCTL];
/// Everything a backup or restore needs.
pub const BACKUP_DEPENDENCIES: &[Dependency] = &[MARIADB, MARIADB_DUMP, TAR];
