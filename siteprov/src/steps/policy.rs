//! Per-step overrides of the required flag.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};

/// Configured overrides of which steps are required.
///
/// ```toml
/// [steps]
/// required = ["install-plugins"]
/// optional = ["tune-php"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StepPolicy {
    /// Steps forced to be required.
    pub required: Vec<String>,
    /// Steps forced to be optional.
    pub optional: Vec<String>,
}

impl StepPolicy {
    /// Resolves the required flag for a step, falling back to its default.
    #[must_use]
    pub fn resolve(&self, step: &str, default: bool) -> bool {
        if self.required.iter().any(|s| s == step) {
            true
        } else if self.optional.iter().any(|s| s == step) {
            false
        } else {
            default
        }
    }

    /// Rejects a step named in both lists.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(both) = self.required.iter().find(|s| self.optional.contains(s)) {
            return Err(ConfigError::invalid(
                "steps",
                format!("step '{both}' is listed as both required and optional"),
            ));
        }
        Ok(())
    }

    /// Returns true if no overrides are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.optional.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults() {
        let policy = StepPolicy::default();
        assert!(policy.resolve("create-database", true));
        assert!(!policy.resolve("install-plugins", false));
    }

    #[test]
    fn test_resolve_overrides() {
        let policy = StepPolicy {
            required: vec!["install-plugins".into()],
            optional: vec!["tune-php".into()],
        };
        assert!(policy.resolve("install-plugins", false));
        assert!(!policy.resolve("tune-php", true));
    }

    #[test]
    fn test_validate_conflict() {
        let policy = StepPolicy {
            required: vec!["a".into()],
            optional: vec!["a".into()],
        };
        assert!(policy.validate().is_err());
        assert!(StepPolicy::default().validate().is_ok());
    }
}
