//! Password-based SSH authentication.

use async_trait::async_trait;
use russh::MethodKind;
use russh::client::{self, AuthResult};
use tracing::debug;

use crate::turnin::client::{execute_ssh_command, open_transport};
use crate::turnin::config::ConnectSettings;
use crate::turnin::error::AttemptError;
use crate::turnin::session::{SshClientHandler, close_handle};
use crate::turnin::types::{Credentials, Gateway};

use super::traits::{AuthStrategy, IDENTITY_COMMAND, reported_identity};

/// Password authentication strategy.
///
/// Uses username/password credentials to authenticate with the gateway.
pub struct PasswordAuth {
    settings: ConnectSettings,
}

impl PasswordAuth {
    /// Create a new password authentication strategy.
    pub fn new(settings: ConnectSettings) -> Self {
        Self { settings }
    }

    /// Open a fresh transport and authenticate it with the secret.
    ///
    /// The transport is disconnected again if authentication does not succeed.
    pub(crate) async fn login(
        &self,
        gateway: &Gateway,
        credentials: &Credentials,
    ) -> Result<client::Handle<SshClientHandler>, AttemptError> {
        let mut handle = open_transport(gateway, &self.settings)
            .await
            .map_err(AttemptError::Transport)?;

        let auth = tokio::time::timeout(
            self.settings.auth_timeout,
            handle.authenticate_password(credentials.username(), credentials.secret()),
        )
        .await;

        let outcome = match auth {
            Err(_) => Err(AttemptError::Transport(format!(
                "Authentication timed out after {:?}",
                self.settings.auth_timeout
            ))),
            Ok(Err(e)) => Err(AttemptError::Transport(format!(
                "Password authentication error: {}",
                e
            ))),
            Ok(Ok(result)) if result.success() => Ok(()),
            Ok(Ok(AuthResult::Failure {
                remaining_methods, ..
            })) => Err(classify_password_failure(&remaining_methods)),
            Ok(Ok(_)) => Err(AttemptError::Rejected),
        };

        match outcome {
            Ok(()) => Ok(handle),
            Err(e) => {
                close_handle(&handle).await;
                Err(e)
            }
        }
    }
}

/// Decide why the gateway refused a password attempt.
///
/// If `password` is still among the methods that can continue, the secret
/// was tried and rejected. Otherwise the method is not offered at all.
pub(crate) fn classify_password_failure(remaining: &[MethodKind]) -> AttemptError {
    if remaining.contains(&MethodKind::Password) {
        AttemptError::Rejected
    } else {
        AttemptError::MethodUnavailable {
            interactive_offered: remaining.contains(&MethodKind::KeyboardInteractive),
        }
    }
}

#[async_trait]
impl AuthStrategy for PasswordAuth {
    async fn verify(
        &self,
        gateway: &Gateway,
        credentials: &Credentials,
    ) -> Result<String, AttemptError> {
        let handle = self.login(gateway, credentials).await?;

        let result =
            execute_ssh_command(&handle, IDENTITY_COMMAND, self.settings.command_timeout).await;
        close_handle(&handle).await;

        let identity = reported_identity(result, self.settings.command_timeout)?;
        debug!("Identity check over password session returned '{}'", identity);
        Ok(identity)
    }

    fn name(&self) -> &'static str {
        "password"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_auth_name() {
        let auth = PasswordAuth::new(ConnectSettings::default());
        assert_eq!(auth.name(), "password");
    }

    #[test]
    fn test_password_still_offered_means_rejected() {
        let err = classify_password_failure(&[MethodKind::PublicKey, MethodKind::Password]);
        assert_eq!(err, AttemptError::Rejected);
    }

    #[test]
    fn test_only_interactive_offered() {
        let err = classify_password_failure(&[MethodKind::KeyboardInteractive]);
        assert_eq!(
            err,
            AttemptError::MethodUnavailable {
                interactive_offered: true
            }
        );
    }

    #[test]
    fn test_no_usable_method() {
        let err = classify_password_failure(&[MethodKind::PublicKey]);
        assert_eq!(
            err,
            AttemptError::MethodUnavailable {
                interactive_offered: false
            }
        );
        assert_eq!(
            classify_password_failure(&[]),
            AttemptError::MethodUnavailable {
                interactive_offered: false
            }
        );
    }
}
