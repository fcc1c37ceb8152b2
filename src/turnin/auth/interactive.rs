//! Keyboard-interactive SSH authentication.
//!
//! Some gateways disable the plain `password` method and ask for the same
//! password through keyboard-interactive prompts instead. Every prompt the
//! server sends is answered with the secret.

use async_trait::async_trait;
use russh::client::{self, KeyboardInteractiveAuthResponse};
use tracing::debug;

use crate::turnin::client::{execute_ssh_command, open_transport};
use crate::turnin::config::ConnectSettings;
use crate::turnin::error::AttemptError;
use crate::turnin::session::{SshClientHandler, close_handle};
use crate::turnin::types::{Credentials, Gateway};

use super::traits::{AuthStrategy, IDENTITY_COMMAND, reported_identity};

/// Upper bound on InfoRequest rounds before giving up on a transport.
const MAX_PROMPT_ROUNDS: usize = 5;

/// Keyboard-interactive authentication strategy.
///
/// Each attempt uses a brand-new TCP socket and SSH transport; a transport
/// whose keyboard-interactive exchange failed is never reused.
pub struct InteractiveAuth {
    settings: ConnectSettings,
}

impl InteractiveAuth {
    pub fn new(settings: ConnectSettings) -> Self {
        Self { settings }
    }

    pub(crate) async fn login(
        &self,
        gateway: &Gateway,
        credentials: &Credentials,
    ) -> Result<client::Handle<SshClientHandler>, AttemptError> {
        let mut handle = open_transport(gateway, &self.settings)
            .await
            .map_err(AttemptError::Transport)?;

        let outcome = tokio::time::timeout(
            self.settings.auth_timeout,
            answer_prompts(&mut handle, credentials),
        )
        .await
        .unwrap_or_else(|_| {
            Err(AttemptError::Transport(format!(
                "Keyboard-interactive authentication timed out after {:?}",
                self.settings.auth_timeout
            )))
        });

        match outcome {
            Ok(()) => Ok(handle),
            Err(e) => {
                close_handle(&handle).await;
                Err(e)
            }
        }
    }
}

/// What to do after one server message of the exchange.
#[derive(Debug, PartialEq, Eq)]
enum PromptStep {
    Authenticated,
    Respond(Vec<String>),
}

/// Decide how to answer server message number `round`.
///
/// Every prompt of an info request gets the secret. The server may ask at
/// most [`MAX_PROMPT_ROUNDS`] times before the attempt is abandoned.
fn prompt_step(
    response: KeyboardInteractiveAuthResponse,
    round: usize,
    secret: &str,
) -> Result<PromptStep, AttemptError> {
    match response {
        KeyboardInteractiveAuthResponse::Success => Ok(PromptStep::Authenticated),
        KeyboardInteractiveAuthResponse::Failure { .. } => Err(AttemptError::Rejected),
        KeyboardInteractiveAuthResponse::InfoRequest { .. } if round > MAX_PROMPT_ROUNDS => {
            Err(AttemptError::Transport(format!(
                "Keyboard-interactive authentication still prompting after {} rounds",
                MAX_PROMPT_ROUNDS
            )))
        }
        KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => {
            debug!(
                "Keyboard-interactive round {}: answering {} prompt(s)",
                round,
                prompts.len()
            );
            Ok(PromptStep::Respond(vec![secret.to_string(); prompts.len()]))
        }
    }
}

async fn answer_prompts(
    handle: &mut client::Handle<SshClientHandler>,
    credentials: &Credentials,
) -> Result<(), AttemptError> {
    let mut response = handle
        .authenticate_keyboard_interactive_start(credentials.username(), None::<String>)
        .await
        .map_err(|e| AttemptError::Transport(format!("Keyboard-interactive start failed: {}", e)))?;

    let mut round = 1;
    loop {
        match prompt_step(response, round, credentials.secret())? {
            PromptStep::Authenticated => return Ok(()),
            PromptStep::Respond(answers) => {
                response = handle
                    .authenticate_keyboard_interactive_respond(answers)
                    .await
                    .map_err(|e| {
                        AttemptError::Transport(format!("Keyboard-interactive respond failed: {}", e))
                    })?;
                round += 1;
            }
        }
    }
}

#[async_trait]
impl AuthStrategy for InteractiveAuth {
    async fn verify(
        &self,
        gateway: &Gateway,
        credentials: &Credentials,
    ) -> Result<String, AttemptError> {
        let handle = self.login(gateway, credentials).await?;

        // Fresh channel on the freshly authenticated transport.
        let result =
            execute_ssh_command(&handle, IDENTITY_COMMAND, self.settings.command_timeout).await;
        close_handle(&handle).await;

        reported_identity(result, self.settings.command_timeout)
    }

    fn name(&self) -> &'static str {
        "keyboard-interactive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interactive_auth_name() {
        let auth = InteractiveAuth::new(ConnectSettings::default());
        assert_eq!(auth.name(), "keyboard-interactive");
    }

    #[test]
    fn test_interactive_auth_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<InteractiveAuth>();
    }

    #[test]
    fn test_implements_auth_strategy_trait() {
        fn requires_auth_strategy(_: &dyn AuthStrategy) {}
        requires_auth_strategy(&InteractiveAuth::new(ConnectSettings::default()));
    }

    mod prompt_rounds {
        use super::*;
        use russh::client::Prompt;
        use russh::{MethodKind, MethodSet};

        fn info_request(prompts: &[&str]) -> KeyboardInteractiveAuthResponse {
            KeyboardInteractiveAuthResponse::InfoRequest {
                name: String::new(),
                instructions: String::new(),
                prompts: prompts
                    .iter()
                    .map(|p| Prompt {
                        prompt: p.to_string(),
                        echo: false,
                    })
                    .collect(),
            }
        }

        #[test]
        fn test_every_prompt_gets_the_secret() {
            let step = prompt_step(info_request(&["Password: ", "Password again: "]), 1, "pw");
            assert_eq!(
                step,
                Ok(PromptStep::Respond(vec!["pw".to_string(), "pw".to_string()]))
            );
        }

        #[test]
        fn test_multi_round_exchange_until_success() {
            let script = [
                info_request(&["Password: "]),
                info_request(&[]),
                KeyboardInteractiveAuthResponse::Success,
            ];
            let steps: Vec<_> = script
                .into_iter()
                .enumerate()
                .map(|(i, response)| prompt_step(response, i + 1, "pw"))
                .collect();
            assert_eq!(
                steps,
                vec![
                    Ok(PromptStep::Respond(vec!["pw".to_string()])),
                    Ok(PromptStep::Respond(vec![])),
                    Ok(PromptStep::Authenticated),
                ]
            );
        }

        #[test]
        fn test_failure_is_rejected() {
            let response = KeyboardInteractiveAuthResponse::Failure {
                remaining_methods: MethodSet::from(&[MethodKind::KeyboardInteractive][..]),
                partial_success: false,
            };
            assert_eq!(prompt_step(response, 2, "pw"), Err(AttemptError::Rejected));
        }

        #[test]
        fn test_endless_prompting_is_cut_off() {
            assert!(matches!(
                prompt_step(info_request(&["Password: "]), MAX_PROMPT_ROUNDS, "pw"),
                Ok(PromptStep::Respond(_))
            ));
            match prompt_step(info_request(&["Password: "]), MAX_PROMPT_ROUNDS + 1, "pw") {
                Err(AttemptError::Transport(message)) => {
                    assert!(message.contains("still prompting"))
                }
                other => panic!("unexpected step: {:?}", other),
            }
        }

        #[test]
        fn test_success_after_last_allowed_round() {
            assert_eq!(
                prompt_step(KeyboardInteractiveAuthResponse::Success, MAX_PROMPT_ROUNDS + 1, "pw"),
                Ok(PromptStep::Authenticated)
            );
        }
    }
}
