//! Credential validation state machine.
//!
//! ```text
//!   TryPassword(1..=3) --match--------------------------> Authenticated
//!        |  |  |------mismatch / rejected / no method----> Failed
//!        |  |---------transient transport error----------> TryPassword(n+1) after delay
//!        |------------interactive offered / no session---> Fallback(1)
//!   Fallback(1..=3) --match-----------------------------> Authenticated
//!        |------------anything else, n < 3--------------> Fallback(n+1) after delay
//!        |------------anything else, n == 3-------------> Failed(InteractiveAuthExhausted)
//! ```
//!
//! Each state is one loop iteration, so the transitions can be exercised with
//! scripted strategies and paused time.

use std::time::Duration;

use backon::{BackoffBuilder, ConstantBackoff, ConstantBuilder};
use tracing::{debug, info, warn};

use crate::turnin::config::{ConnectSettings, MAX_AUTH_ATTEMPTS};
use crate::turnin::error::{AttemptError, SubmitError, indicates_missing_session, is_retryable_error};
use crate::turnin::types::{AuthOutcome, Credentials, Gateway};

use super::traits::AuthStrategy;
use super::{InteractiveAuth, PasswordAuth};

/// Why the password phase handed over to keyboard-interactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackTrigger {
    /// The gateway refused `password` but offers `keyboard-interactive`.
    InteractiveOffered,
    /// The transport reported that no session exists any more.
    MissingSession,
}

#[derive(Debug)]
enum AuthState {
    TryPassword { attempt: u32 },
    Fallback { attempt: u32, trigger: FallbackTrigger },
    Authenticated,
    Failed(SubmitError),
}

/// Where one password attempt leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PasswordStep {
    Authenticated,
    Retry,
    Fallback(FallbackTrigger),
    Fail(SubmitError),
}

/// Classify the result of password attempt number `attempt`.
pub(crate) fn password_step(
    attempt: u32,
    result: Result<String, AttemptError>,
    credentials: &Credentials,
) -> PasswordStep {
    match result {
        Ok(identity) if credentials.matches_identity(&identity) => PasswordStep::Authenticated,
        Ok(_) => PasswordStep::Fail(SubmitError::UnverifiedIdentity),
        Err(AttemptError::Rejected) => PasswordStep::Fail(SubmitError::InvalidCredentials),
        Err(AttemptError::MethodUnavailable {
            interactive_offered: true,
        }) => PasswordStep::Fallback(FallbackTrigger::InteractiveOffered),
        Err(AttemptError::MethodUnavailable {
            interactive_offered: false,
        }) => PasswordStep::Fail(SubmitError::UnsupportedAuthMethod),
        Err(AttemptError::Transport(e)) if indicates_missing_session(&e) => {
            PasswordStep::Fallback(FallbackTrigger::MissingSession)
        }
        Err(AttemptError::Transport(e)) if is_retryable_error(&e) && attempt < MAX_AUTH_ATTEMPTS => {
            PasswordStep::Retry
        }
        Err(AttemptError::Transport(e)) => PasswordStep::Fail(SubmitError::Transport(e)),
    }
}

/// Validates a username/secret pair against the gateway.
pub struct Authenticator {
    password: Box<dyn AuthStrategy>,
    interactive: Box<dyn AuthStrategy>,
    retry_delay: Duration,
}

impl Authenticator {
    pub fn new(settings: ConnectSettings, retry_delay: Duration) -> Self {
        Self::with_strategies(
            Box::new(PasswordAuth::new(settings.clone())),
            Box::new(InteractiveAuth::new(settings)),
            retry_delay,
        )
    }

    pub fn with_strategies(
        password: Box<dyn AuthStrategy>,
        interactive: Box<dyn AuthStrategy>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            password,
            interactive,
            retry_delay,
        }
    }

    /// Fixed delays between attempts of one phase.
    fn delays(&self) -> ConstantBackoff {
        ConstantBuilder::default()
            .with_delay(self.retry_delay)
            .with_max_times(MAX_AUTH_ATTEMPTS.saturating_sub(1) as usize)
            .build()
    }

    /// Run the state machine to completion. Produces exactly one outcome.
    pub async fn authenticate(&self, gateway: &Gateway, username: &str, secret: &str) -> AuthOutcome {
        let credentials = Credentials::new(username, secret);
        let mut password_delays = self.delays();
        let mut interactive_delays = self.delays();
        let mut state = AuthState::TryPassword { attempt: 1 };

        loop {
            state = match state {
                AuthState::TryPassword { attempt } => {
                    debug!(
                        "Trying {} authentication for {} on {} (attempt {}/{})",
                        self.password.name(),
                        credentials.username(),
                        gateway,
                        attempt,
                        MAX_AUTH_ATTEMPTS
                    );
                    let result = self.password.verify(gateway, &credentials).await;
                    if let Err(e) = &result {
                        debug!("{} attempt {} failed: {}", self.password.name(), attempt, e);
                    }

                    match password_step(attempt, result, &credentials) {
                        PasswordStep::Authenticated => AuthState::Authenticated,
                        PasswordStep::Retry => {
                            let delay = password_delays.next().unwrap_or(self.retry_delay);
                            warn!("Transient gateway error, retrying in {:?}", delay);
                            tokio::time::sleep(delay).await;
                            AuthState::TryPassword {
                                attempt: attempt + 1,
                            }
                        }
                        PasswordStep::Fallback(trigger) => {
                            info!("Falling back to keyboard-interactive ({:?})", trigger);
                            AuthState::Fallback {
                                attempt: 1,
                                trigger,
                            }
                        }
                        PasswordStep::Fail(e) => AuthState::Failed(e),
                    }
                }
                AuthState::Fallback { attempt, trigger } => {
                    match self.interactive.verify(gateway, &credentials).await {
                        Ok(identity) if credentials.matches_identity(&identity) => {
                            AuthState::Authenticated
                        }
                        other => {
                            match other {
                                Ok(identity) => warn!(
                                    "Interactive attempt {} authenticated as '{}', expected '{}'",
                                    attempt,
                                    identity.trim(),
                                    credentials.username()
                                ),
                                Err(e) => warn!("Interactive attempt {} failed: {}", attempt, e),
                            }

                            if attempt >= MAX_AUTH_ATTEMPTS {
                                AuthState::Failed(SubmitError::InteractiveAuthExhausted {
                                    attempts: attempt,
                                })
                            } else {
                                let delay = interactive_delays.next().unwrap_or(self.retry_delay);
                                tokio::time::sleep(delay).await;
                                AuthState::Fallback {
                                    attempt: attempt + 1,
                                    trigger,
                                }
                            }
                        }
                    }
                }
                AuthState::Authenticated => {
                    info!("Authenticated {} on {}", credentials.username(), gateway);
                    return AuthOutcome::Authenticated(credentials);
                }
                AuthState::Failed(e) => {
                    warn!("Authentication for {} failed: {} ({})", credentials.username(), e, e.kind());
                    return AuthOutcome::Failed(e);
                }
            };
        }
    }
}
