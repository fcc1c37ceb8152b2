//! Scripted driving of the interactive submission session.
//!
//! One PTY shell is opened on the gateway and used for the whole protocol:
//!
//! 1. Send the nested login command for the target workstation.
//! 2. Read and clean output, answering password prompts with the secret
//!    (at most [`DriverTimings::max_secret_injections`] times).
//! 3. Consider the workstation shell ready once cleaned output since the last
//!    injection ends in `$` or `#`. If that never happens within
//!    [`DriverTimings::shell_ready_timeout`], carry on anyway.
//! 4. Send the submission command.
//! 5. Answer confirmation questions until no output arrived for
//!    [`DriverTimings::idle_window`]. The tool prints no completion marker,
//!    so silence is the only completion signal.
//! 6. Send `exit`, drain for [`DriverTimings::drain_grace`], close.
//!
//! Prompt detection is a heuristic over [`PromptTable`] rules, matched against
//! all output since the last reply so that prompts split across reads are
//! still recognised. False matches are expected; the reply caps and the idle
//! window bound their effect.
//! Failures never escape as errors: the caller gets the partial transcript
//! together with one [`SubmitError::SessionAutomation`].

use std::time::Duration;

use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::config::{
    ConnectSettings, DEFAULT_IDLE_WINDOW_SECS, DEFAULT_SHELL_READY_TIMEOUT_SECS,
    DEFAULT_SUBMIT_COMMAND, DRAIN_GRACE, MAX_CONFIRMATIONS, MAX_SECRET_INJECTIONS, TurninConfig,
};
use super::error::SubmitError;
use super::prompt::{PromptTable, Reply, Stage, ends_with_shell_prompt};
use super::shell::{PtyShell, ShellChannel};
use super::transcript::{Completion, Transcript};
use super::types::{Credentials, Gateway, SubmissionRequest};

/// Time bounds and reply caps of one driven session.
#[derive(Debug, Clone)]
pub struct DriverTimings {
    pub shell_ready_timeout: Duration,
    pub idle_window: Duration,
    pub drain_grace: Duration,
    pub max_secret_injections: usize,
    pub max_confirmations: usize,
}

impl Default for DriverTimings {
    fn default() -> Self {
        Self {
            shell_ready_timeout: Duration::from_secs(DEFAULT_SHELL_READY_TIMEOUT_SECS),
            idle_window: Duration::from_secs(DEFAULT_IDLE_WINDOW_SECS),
            drain_grace: DRAIN_GRACE,
            max_secret_injections: MAX_SECRET_INJECTIONS,
            max_confirmations: MAX_CONFIRMATIONS,
        }
    }
}

/// Result of driving a session. Exactly one of clean or partial transcript.
#[derive(Debug)]
pub enum DriveOutcome {
    Completed(Transcript),
    Failed {
        partial: Transcript,
        error: SubmitError,
    },
}

impl DriveOutcome {
    pub fn transcript(&self) -> &Transcript {
        match self {
            DriveOutcome::Completed(transcript) => transcript,
            DriveOutcome::Failed { partial, .. } => partial,
        }
    }

    pub fn error(&self) -> Option<&SubmitError> {
        match self {
            DriveOutcome::Completed(_) => None,
            DriveOutcome::Failed { error, .. } => Some(error),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, DriveOutcome::Completed(_))
    }
}

pub struct SessionDriver {
    prompts: PromptTable,
    timings: DriverTimings,
    submit_tool: String,
}

impl SessionDriver {
    pub fn new(timings: DriverTimings) -> Self {
        Self {
            prompts: PromptTable::standard(),
            timings,
            submit_tool: DEFAULT_SUBMIT_COMMAND.to_string(),
        }
    }

    pub fn from_config(config: &TurninConfig) -> Self {
        Self::new(DriverTimings {
            shell_ready_timeout: config.shell_ready_timeout,
            idle_window: config.idle_window,
            ..DriverTimings::default()
        })
        .with_submit_tool(&config.submit_command)
    }

    pub fn with_prompts(mut self, prompts: PromptTable) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_submit_tool(mut self, tool: &str) -> Self {
        self.submit_tool = tool.to_string();
        self
    }

    pub fn timings(&self) -> &DriverTimings {
        &self.timings
    }

    /// Open a shell on the gateway and drive the submission over it.
    pub async fn drive_submission(
        &self,
        gateway: &Gateway,
        credentials: &Credentials,
        request: &SubmissionRequest,
        settings: &ConnectSettings,
    ) -> DriveOutcome {
        match PtyShell::open(gateway, credentials, settings).await {
            Ok(mut shell) => self.drive(&mut shell, credentials, request).await,
            Err(e) => DriveOutcome::Failed {
                partial: Transcript::new(),
                error: SubmitError::SessionAutomation(e),
            },
        }
    }

    /// Drive the protocol over an already open shell, closing it afterwards.
    pub async fn drive<S: ShellChannel + ?Sized>(
        &self,
        shell: &mut S,
        credentials: &Credentials,
        request: &SubmissionRequest,
    ) -> DriveOutcome {
        let mut transcript = Transcript::new();
        let result = self
            .run(shell, credentials, request, &mut transcript)
            .await;
        shell.close().await;

        match result {
            Ok(()) => {
                info!(
                    "Submission of {} on {} completed ({} bytes of output)",
                    request.target_id(),
                    request.target_host,
                    transcript.len()
                );
                DriveOutcome::Completed(transcript)
            }
            Err(error) => {
                warn!("Driving submission on {} failed: {}", request.target_host, error);
                DriveOutcome::Failed {
                    partial: transcript,
                    error,
                }
            }
        }
    }

    async fn run<S: ShellChannel + ?Sized>(
        &self,
        shell: &mut S,
        credentials: &Credentials,
        request: &SubmissionRequest,
        transcript: &mut Transcript,
    ) -> Result<(), SubmitError> {
        debug!("Hopping to {}", request.target_host);
        send(shell, request.hop_command().as_bytes()).await?;
        self.await_shell_ready(shell, credentials, transcript).await?;

        let command = request.submit_command(&self.submit_tool);
        debug!("Sending {}", command.trim_end());
        transcript.mark_replied();
        send(shell, command.as_bytes()).await?;
        self.await_idle(shell, credentials, transcript).await?;
        transcript.mark_completion(Completion::Idle);

        if let Err(e) = shell.send(b"exit\n").await {
            debug!("Could not send exit: {}", e);
        }
        self.drain(shell, transcript).await;
        Ok(())
    }

    /// Answer hop password prompts until the workstation shell shows up.
    async fn await_shell_ready<S: ShellChannel + ?Sized>(
        &self,
        shell: &mut S,
        credentials: &Credentials,
        transcript: &mut Transcript,
    ) -> Result<(), SubmitError> {
        let deadline = Instant::now() + self.timings.shell_ready_timeout;
        let mut injections = 0;

        loop {
            let chunk = match timeout_at(deadline, shell.recv()).await {
                Err(_) => {
                    warn!(
                        "No shell prompt from {:?} after {:?}, sending the submission anyway",
                        transcript.as_str().lines().last().unwrap_or_default(),
                        self.timings.shell_ready_timeout
                    );
                    return Ok(());
                }
                Ok(None) => {
                    return Err(SubmitError::SessionAutomation(
                        "channel closed before the workstation shell was ready".to_string(),
                    ));
                }
                Ok(Some(Err(e))) => return Err(SubmitError::SessionAutomation(e)),
                Ok(Some(Ok(chunk))) => chunk,
            };

            transcript.append(&chunk);
            if let Some(rule) = self.prompts.detect(Stage::Hop, transcript.unanswered()) {
                if injections < self.timings.max_secret_injections {
                    injections += 1;
                    debug!("Prompt '{}' seen, reply {}", rule.pattern, injections);
                    reply(shell, &rule.reply, credentials).await?;
                    transcript.mark_replied();
                    continue;
                }
                debug!("Prompt '{}' ignored, reply cap reached", rule.pattern);
            }

            if injections > 0 && ends_with_shell_prompt(transcript.unanswered()) {
                debug!("Workstation shell ready after {} injection(s)", injections);
                return Ok(());
            }
        }
    }

    /// Answer confirmation questions until output stays quiet for the idle window.
    async fn await_idle<S: ShellChannel + ?Sized>(
        &self,
        shell: &mut S,
        credentials: &Credentials,
        transcript: &mut Transcript,
    ) -> Result<(), SubmitError> {
        let mut confirmations = 0;

        loop {
            let chunk = match timeout(self.timings.idle_window, shell.recv()).await {
                Err(_) => {
                    debug!("No output for {:?}, command complete", self.timings.idle_window);
                    return Ok(());
                }
                Ok(None) => {
                    return Err(SubmitError::SessionAutomation(
                        "channel closed while the submission command was running".to_string(),
                    ));
                }
                Ok(Some(Err(e))) => return Err(SubmitError::SessionAutomation(e)),
                Ok(Some(Ok(chunk))) => chunk,
            };

            transcript.append(&chunk);
            if let Some(rule) = self.prompts.detect(Stage::Submit, transcript.unanswered()) {
                if confirmations < self.timings.max_confirmations {
                    confirmations += 1;
                    debug!("Confirmation '{}' seen, answering", rule.pattern);
                    reply(shell, &rule.reply, credentials).await?;
                    transcript.mark_replied();
                } else {
                    debug!("Confirmation '{}' ignored, reply cap reached", rule.pattern);
                }
            }
        }
    }

    /// Collect whatever is still buffered after `exit`.
    async fn drain<S: ShellChannel + ?Sized>(&self, shell: &mut S, transcript: &mut Transcript) {
        let deadline = Instant::now() + self.timings.drain_grace;
        while let Ok(Some(Ok(chunk))) = timeout_at(deadline, shell.recv()).await {
            transcript.append(&chunk);
        }
    }
}

impl Default for SessionDriver {
    fn default() -> Self {
        Self::new(DriverTimings::default())
    }
}

async fn send<S: ShellChannel + ?Sized>(shell: &mut S, data: &[u8]) -> Result<(), SubmitError> {
    shell.send(data).await.map_err(SubmitError::SessionAutomation)
}

async fn reply<S: ShellChannel + ?Sized>(
    shell: &mut S,
    reply: &Reply,
    credentials: &Credentials,
) -> Result<(), SubmitError> {
    let line = match reply {
        Reply::Secret => Zeroizing::new(format!("{}\n", credentials.secret())),
        Reply::Text(text) => Zeroizing::new(format!("{}\n", text)),
    };
    send(shell, line.as_bytes()).await
}
