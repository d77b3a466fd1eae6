//! Contexts and configuration for tests.

use super::ScriptedRunner;
use crate::config::ProvisionConfig;
use crate::context::{RunContext, SiteName};
use crate::prompt::ScriptedPrompter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Default configuration with every path under `root` and sudo disabled.
#[must_use]
pub fn test_config(root: &Path) -> ProvisionConfig {
    ProvisionConfig::default().rooted_at(root)
}

/// A fresh, not yet created directory under the system temp dir.
#[must_use]
pub fn scratch_root() -> PathBuf {
    std::env::temp_dir().join(format!("siteprov-test-{}", Uuid::new_v4().simple()))
}

/// A context for `site` with every path under `root`.
///
/// Commands go to a [`ScriptedRunner`] that succeeds for everything and
/// prompts to an empty [`ScriptedPrompter`], so confirmations are denied.
///
/// # Panics
///
/// Panics if `site` is not a valid site name.
#[must_use]
pub fn context_at(root: &Path, site: &str) -> RunContext {
    let site = SiteName::new(site).unwrap_or_else(|e| panic!("bad test site name: {e}"));
    RunContext::new(site, Arc::new(test_config(root)))
        .with_runner(Arc::new(ScriptedRunner::new()))
        .with_prompter(Arc::new(ScriptedPrompter::new()))
}

/// A context for `site` rooted in a fresh scratch directory.
///
/// # Panics
///
/// Panics if `site` is not a valid site name.
#[must_use]
pub fn test_context(site: &str) -> RunContext {
    context_at(&scratch_root(), site)
}
