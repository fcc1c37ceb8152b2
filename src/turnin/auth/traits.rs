//! Authentication strategy trait definition.
//!
//! Defines the interface for authentication strategies, enabling
//! the Strategy pattern for gateway authentication methods.

use std::time::Duration;

use async_trait::async_trait;

use crate::turnin::client::CommandOutput;
use crate::turnin::error::AttemptError;
use crate::turnin::types::{Credentials, Gateway};

/// Trait for gateway authentication strategies.
///
/// Implementations must be thread-safe (`Send + Sync`) for use across
/// async tasks. Each call is one complete attempt: open a fresh connection,
/// authenticate, run the identity check and disconnect again.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Attempt to authenticate against the gateway.
    ///
    /// # Returns
    ///
    /// * `Ok(identity)` - Authentication succeeded; the gateway's `whoami` answer
    /// * `Err(AttemptError::Rejected)` - The secret was tried and refused
    /// * `Err(AttemptError::MethodUnavailable { .. })` - The method is not offered
    /// * `Err(AttemptError::Transport(message))` - Anything below authentication
    async fn verify(
        &self,
        gateway: &Gateway,
        credentials: &Credentials,
    ) -> Result<String, AttemptError>;

    /// Get the name of this authentication strategy.
    ///
    /// Used for logging and debugging purposes.
    fn name(&self) -> &'static str;
}

/// Command whose output names the authenticated user.
pub(crate) const IDENTITY_COMMAND: &str = "whoami";

/// Turn the identity command's result into the user it reported.
///
/// A command that did not finish is a transport problem, not an empty answer.
pub(crate) fn reported_identity(
    output: Result<CommandOutput, String>,
    timeout: Duration,
) -> Result<String, AttemptError> {
    let output = output.map_err(AttemptError::Transport)?;
    if output.timed_out {
        return Err(AttemptError::Transport(format!(
            "Identity check '{}' timed out after {:?}",
            IDENTITY_COMMAND, timeout
        )));
    }
    Ok(output.stdout.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turnin::error::is_retryable_error;

    fn output(stdout: &str, timed_out: bool) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: if timed_out { -1 } else { 0 },
            timed_out,
        }
    }

    #[test]
    fn test_identity_is_trimmed() {
        let identity = reported_identity(Ok(output("alice\r\n", false)), Duration::from_secs(10));
        assert_eq!(identity.unwrap(), "alice");
    }

    #[test]
    fn test_timed_out_identity_check_is_retryable_transport_error() {
        let err = reported_identity(Ok(output("", true)), Duration::from_secs(10)).unwrap_err();
        match err {
            AttemptError::Transport(message) => {
                assert!(message.contains("whoami"));
                assert!(is_retryable_error(&message));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_partial_output_of_timed_out_check_is_not_an_identity() {
        let err = reported_identity(Ok(output("ali", true)), Duration::from_secs(10));
        assert!(matches!(err, Err(AttemptError::Transport(_))));
    }

    #[test]
    fn test_channel_error_is_transport() {
        let err = reported_identity(Err("Failed to open channel: closed".to_string()), Duration::from_secs(10));
        assert_eq!(
            err,
            Err(AttemptError::Transport("Failed to open channel: closed".to_string()))
        );
    }
}
