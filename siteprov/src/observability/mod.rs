//! Diagnostic logging setup.
//!
//! Diagnostics go to stderr through `tracing`; they are separate from the
//! run log, which records only step outcomes. `RUST_LOG` overrides the
//! default filter.

use tracing::Span;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter,
};

use crate::context::RunContext;

/// Default filter directives.
#[must_use]
pub const fn default_directives(verbose: bool) -> &'static str {
    if verbose {
        "siteprov=debug,info"
    } else {
        "siteprov=info,warn"
    }
}

/// Installs the global subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_tracing(verbose: bool) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(verbose)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose)
                .with_thread_ids(false)
                .with_thread_names(false)
                .compact(),
        )
        .try_init()
}

/// A span carrying the identity of one run.
#[must_use]
pub fn run_span(ctx: &RunContext, operation: &str) -> Span {
    tracing::info_span!(
        "run",
        operation,
        site = %ctx.site(),
        run_id = %ctx.identity().run_id,
        dry_run = ctx.is_dry_run(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives(false), "siteprov=info,warn");
        assert!(default_directives(true).starts_with("siteprov=debug"));
    }

    #[test]
    fn test_second_init_fails() {
        let _ = init_tracing(false);
        assert!(init_tracing(false).is_err());
    }

    #[test]
    fn test_run_span_builds() {
        let ctx = test_context("blog");
        let span = run_span(&ctx, "install");
        let _entered = span.enter();
        tracing::debug!("inside run span");
    }
}
