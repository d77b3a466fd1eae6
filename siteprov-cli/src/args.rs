//! Command-line arguments.

use clap::{ArgGroup, Parser};
use siteprov::workflows::Operation;
use std::path::PathBuf;

/// siteprov - provision WordPress sites on nginx, PHP-FPM and MariaDB
#[derive(Debug, Parser)]
#[command(name = "siteprov")]
#[command(about = "Provision, inspect, back up and remove WordPress sites")]
#[command(long_about = r#"
siteprov runs a fixed plan of steps against one site. Required steps that fail
roll back everything done so far; optional steps that fail are logged as
warnings. Every run writes a timestamped log.

Without an operation flag the site is installed.

EXAMPLES:
  # Install a site called blog
  siteprov blog

  # Show what an install would do without changing anything
  siteprov blog --dry-run

  # Back up, then restore the newest backup
  siteprov blog --backup
  siteprov blog --restore
  siteprov blog --restore=20260501-093000.000

  # Remove a site without being asked
  siteprov blog --remove --yes --answers answers.toml

ANSWERS FILE:
  A TOML table of prompt key to answer, e.g.
    "database.admin_password" = "secret"
    "confirm.drop-database" = true
"#)]
#[command(version)]
#[command(group(
    ArgGroup::new("operation")
        .args(["diagnose", "backup", "restore", "remove", "check", "info"])
        .multiple(false)
))]
pub struct Cli {
    /// Site name: lowercase letters, digits and '-'
    pub site: Option<String>,

    /// Check services, configuration and the site without changing anything
    #[arg(long)]
    pub diagnose: bool,

    /// Dump the database and archive the site files
    #[arg(long)]
    pub backup: bool,

    /// Restore a backup (the newest if none is named with --restore=BACKUP)
    #[arg(long, value_name = "BACKUP", num_args = 0..=1, require_equals = true)]
    pub restore: Option<Option<String>>,

    /// Delete the site, its database and its nginx configuration
    #[arg(long)]
    pub remove: bool,

    /// Report missing tools
    #[arg(long)]
    pub check: bool,

    /// Print paths, URL and backups of the site
    #[arg(long)]
    pub info: bool,

    /// Answer yes to every confirmation
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Show what would be done without doing it
    #[arg(long)]
    pub dry_run: bool,

    /// Path to the configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// TOML file of pre-supplied prompt answers
    #[arg(long, value_name = "PATH")]
    pub answers: Option<PathBuf>,

    /// Debug-level diagnostics on stderr
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl Cli {
    /// The operation selected by the flags.
    pub fn operation(&self) -> Operation {
        if self.diagnose {
            Operation::Diagnose
        } else if self.backup {
            Operation::Backup
        } else if let Some(name) = &self.restore {
            Operation::Restore(name.clone())
        } else if self.remove {
            Operation::Remove
        } else if self.check {
            Operation::Check
        } else if self.info {
            Operation::Info
        } else {
            Operation::Install
        }
    }
}
