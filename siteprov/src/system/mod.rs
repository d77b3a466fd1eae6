//! External collaborators.
//!
//! Every program siteprov drives (package manager, systemctl, the database
//! client, nginx, WP-CLI, tar) is invoked through the [`CommandRunner`] seam,
//! so runs can be recorded instead of executed and tested without a host.

pub mod database;
pub mod nginx;
pub mod packages;
mod runner;
pub mod services;
pub mod wpcli;

pub use database::Database;
pub use packages::{Dependency, PackageManager};
pub use wpcli::WpCli;
pub use runner::{
    run_checked, CommandOutput, CommandRunner, CommandSpec, RecordingRunner, Stdin,
    SystemCommandRunner,
};

#[cfg(test)]
pub use runner::MockCommandRunner;
