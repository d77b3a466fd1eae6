//! systemd service control.

use super::CommandSpec;
use crate::context::RunContext;
use crate::errors::ProvisionError;

/// `systemctl <action> <unit>`.
#[must_use]
pub fn systemctl(action: &str, unit: &str) -> CommandSpec {
    CommandSpec::new("systemctl").args([action, unit])
}

/// Returns true if `unit` is active. Never elevated.
pub async fn is_active(ctx: &RunContext, unit: &str) -> Result<bool, ProvisionError> {
    let output = ctx
        .run(&CommandSpec::new("systemctl").args(["is-active", "--quiet", unit]))
        .await?;
    Ok(output.is_success())
}

/// Reloads `unit`.
pub async fn reload(ctx: &RunContext, unit: &str) -> Result<(), ProvisionError> {
    ctx.run_checked(&ctx.privileged(systemctl("reload", unit)))
        .await
        .map(drop)
}

/// Restarts `unit`.
pub async fn restart(ctx: &RunContext, unit: &str) -> Result<(), ProvisionError> {
    ctx.run_checked(&ctx.privileged(systemctl("restart", unit)))
        .await
        .map(drop)
}
