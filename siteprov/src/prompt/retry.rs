//! Re-prompting for rejected credentials.

use super::{Prompt, Prompter};
use crate::errors::ProvisionError;
use crate::utils::Secret;
use std::future::Future;
use tracing::warn;

/// Asks for a secret and verifies it, asking again while it is rejected.
///
/// `verify` returning [`ProvisionError::Authentication`] triggers another
/// prompt, up to `attempts` prompts in total. Any other error is returned
/// immediately. After the last rejected attempt the authentication error is
/// returned.
pub async fn with_auth_retry<T, F, Fut>(
    prompter: &dyn Prompter,
    prompt: &Prompt,
    attempts: u32,
    mut verify: F,
) -> Result<T, ProvisionError>
where
    F: FnMut(Secret) -> Fut,
    Fut: Future<Output = Result<T, ProvisionError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        let secret = prompter.ask_secret(prompt)?;
        match verify(secret).await {
            Err(ProvisionError::Authentication { principal, reason }) if attempt < attempts => {
                warn!(
                    prompt = %prompt.key,
                    attempt,
                    attempts,
                    principal = %principal,
                    reason = %reason,
                    "Credential rejected, asking again"
                );
                attempt += 1;
            }
            other => return other,
        }
    }
}
