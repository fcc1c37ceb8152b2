//! Phase sequencing for one submission attempt.
//!
//! The controller is what a UI calls. It asks the UI for everything it needs
//! through [`SubmissionUi`], runs the four phases of [`SubmissionBackend`]
//! strictly one after another, each as its own tokio task, and reports one
//! notification per phase. Credentials are obtained, passed along by value and
//! dropped when the attempt ends.
//!
//! Cancellation is possible until the session-driving phase starts. After
//! that the session runs to idle completion or failure.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::auth::Authenticator;
use super::config::TurninConfig;
use super::driver::{DriveOutcome, SessionDriver};
use super::error::SubmitError;
use super::hosts;
use super::transfer::{self, TransferSummary};
use super::types::{
    AuthOutcome, Credentials, FileSelection, Gateway, SubmissionReport, SubmissionRequest,
    TransferManifest, parse_assignment_course,
};

pub const MSG_SUBMISSION_CANCELED: &str = "Submission canceled.";
pub const MSG_LOGIN_CANCELED: &str = "Login canceled.";
pub const MSG_EMPTY_CREDENTIALS: &str = "Username and password cannot be empty.";
pub const MSG_NO_HOSTS: &str = "No lab workstations online.";
pub const MSG_NO_HOST_SELECTED: &str = "No workstation selected.";
pub const MSG_INVALID_FORMAT: &str = "Invalid format.";

/// Empty credential entries in a row before the login is given up.
const MAX_CREDENTIAL_PROMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Authenticate,
    DiscoverHosts,
    Transfer,
    DriveSession,
}

impl Phase {
    /// Error a phase reports when its task dies instead of finishing.
    fn task_error(self, message: String) -> SubmitError {
        match self {
            Phase::Authenticate => SubmitError::Transport(message),
            Phase::DiscoverHosts => SubmitError::Directory(message),
            Phase::Transfer => SubmitError::Transfer(message),
            Phase::DriveSession => SubmitError::SessionAutomation(message),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Authenticate => "authenticate",
            Phase::DiscoverHosts => "discover hosts",
            Phase::Transfer => "transfer files",
            Phase::DriveSession => "drive session",
        };
        f.write_str(name)
    }
}

/// Terminal notification of one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseStatus {
    Succeeded,
    Failed(String),
}

/// Interaction points supplied by the UI layer.
///
/// Returning `false`/`None` from a question means the user declined.
pub trait SubmissionUi {
    /// Let the user review and edit the files about to be submitted.
    fn confirm_files(&mut self, selection: &mut FileSelection) -> bool;

    fn credentials(&mut self) -> Option<(String, String)>;

    fn choose_host(&mut self, hosts: &[String]) -> Option<String>;

    /// Raw `assignment@course` input.
    fn assignment_course(&mut self) -> Option<String>;

    fn on_phase(&mut self, phase: Phase, status: &PhaseStatus);

    /// Final transcript or message for the output area.
    fn show(&mut self, message: &str);
}

/// The four remote phases.
#[async_trait]
pub trait SubmissionBackend: Send + Sync + 'static {
    async fn authenticate(&self, username: &str, secret: &str) -> AuthOutcome;

    async fn list_online_hosts(&self, credentials: &Credentials) -> Result<Vec<String>, SubmitError>;

    async fn upload(
        &self,
        credentials: &Credentials,
        manifest: &TransferManifest,
    ) -> Result<TransferSummary, SubmitError>;

    async fn drive_submission(
        &self,
        credentials: &Credentials,
        request: &SubmissionRequest,
    ) -> DriveOutcome;
}

/// Backend talking to the real gateway.
pub struct SshBackend {
    gateway: Gateway,
    config: TurninConfig,
}

impl SshBackend {
    pub fn new(config: TurninConfig) -> Result<Self, SubmitError> {
        let gateway = Gateway::parse(&config.gateway)?;
        Ok(Self { gateway, config })
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }
}

#[async_trait]
impl SubmissionBackend for SshBackend {
    async fn authenticate(&self, username: &str, secret: &str) -> AuthOutcome {
        Authenticator::new(self.config.connect.clone(), self.config.auth_retry_delay)
            .authenticate(&self.gateway, username, secret)
            .await
    }

    async fn list_online_hosts(&self, credentials: &Credentials) -> Result<Vec<String>, SubmitError> {
        hosts::list_online_hosts(
            &self.gateway,
            credentials,
            &self.config.connect,
            &self.config.status_command,
        )
        .await
    }

    async fn upload(
        &self,
        credentials: &Credentials,
        manifest: &TransferManifest,
    ) -> Result<TransferSummary, SubmitError> {
        transfer::upload(&self.gateway, credentials, manifest, &self.config.connect).await
    }

    async fn drive_submission(
        &self,
        credentials: &Credentials,
        request: &SubmissionRequest,
    ) -> DriveOutcome {
        SessionDriver::from_config(&self.config)
            .drive_submission(&self.gateway, credentials, request, &self.config.connect)
            .await
    }
}

/// How a submission attempt ended.
#[derive(Debug, Clone)]
pub enum FlowOutcome {
    Submitted(SubmissionReport),
    /// Stopped before anything was submitted: the user declined or nothing
    /// could be submitted to.
    Cancelled(String),
    /// A phase failed. Carries the partial report when driving had started.
    Failed {
        message: String,
        report: Option<SubmissionReport>,
    },
}

impl FlowOutcome {
    /// The text a UI shows for this outcome.
    pub fn message(&self) -> &str {
        match self {
            FlowOutcome::Submitted(report) => &report.transcript,
            FlowOutcome::Cancelled(message) => message,
            FlowOutcome::Failed { message, .. } => message,
        }
    }
}

enum Stop {
    Cancelled(String),
    Failed(SubmitError),
}

impl From<Stop> for FlowOutcome {
    fn from(stop: Stop) -> Self {
        match stop {
            Stop::Cancelled(message) => FlowOutcome::Cancelled(message),
            Stop::Failed(e) => FlowOutcome::Failed {
                message: e.to_string(),
                report: None,
            },
        }
    }
}

pub struct SubmissionController<B: SubmissionBackend> {
    backend: Arc<B>,
    cancel: Mutex<CancellationToken>,
}

impl<B: SubmissionBackend> SubmissionController<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Token that cancels the running attempt, or the next one if none is
    /// running, while it is still before driving.
    ///
    /// Every attempt ends with a fresh token, so fetch it again per attempt.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn renew_cancel_token(&self) {
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = CancellationToken::new();
    }

    /// Run one complete submission attempt.
    ///
    /// On success the selection is cleared; on any other outcome it is put
    /// back the way it was before the attempt.
    pub async fn run<U: SubmissionUi + ?Sized>(
        &self,
        ui: &mut U,
        selection: &mut FileSelection,
    ) -> FlowOutcome {
        let cancel = self.cancel_token();
        let snapshot = selection.clone();
        let outcome = self.run_flow(ui, selection, &cancel).await;
        self.renew_cancel_token();

        match &outcome {
            FlowOutcome::Submitted(_) => selection.clear(),
            _ => *selection = snapshot,
        }
        ui.show(outcome.message());
        outcome
    }

    async fn run_flow<U: SubmissionUi + ?Sized>(
        &self,
        ui: &mut U,
        selection: &mut FileSelection,
        cancel: &CancellationToken,
    ) -> FlowOutcome {
        let started_at = Utc::now();

        if !ui.confirm_files(selection) || selection.is_empty() {
            return FlowOutcome::Cancelled(MSG_SUBMISSION_CANCELED.to_string());
        }
        let manifest = match selection.to_manifest() {
            Ok(manifest) => manifest,
            Err(e) => return Stop::Failed(e).into(),
        };

        let credentials = match self.login(ui, cancel).await {
            Ok(credentials) => credentials,
            Err(stop) => return stop.into(),
        };

        let backend = self.backend.clone();
        let task_credentials = credentials.clone();
        let online = match self
            .dispatch(ui, cancel, Phase::DiscoverHosts, async move {
                backend.list_online_hosts(&task_credentials).await
            })
            .await
        {
            Ok(hosts) => hosts,
            Err(stop) => return stop.into(),
        };
        if online.is_empty() {
            return FlowOutcome::Cancelled(MSG_NO_HOSTS.to_string());
        }

        let host = match ui.choose_host(&online) {
            Some(host) if !host.trim().is_empty() => host,
            _ => return FlowOutcome::Cancelled(MSG_NO_HOST_SELECTED.to_string()),
        };

        let (assignment, course) = match ui.assignment_course().as_deref().and_then(parse_assignment_course) {
            Some(parsed) => parsed,
            None => return FlowOutcome::Cancelled(MSG_INVALID_FORMAT.to_string()),
        };

        let request = SubmissionRequest::new(assignment, course, host, manifest);

        let backend = self.backend.clone();
        let task_credentials = credentials.clone();
        let task_manifest = request.manifest.clone();
        if let Err(stop) = self
            .dispatch(ui, cancel, Phase::Transfer, async move {
                backend.upload(&task_credentials, &task_manifest).await
            })
            .await
        {
            return stop.into();
        }

        // Past this point there is no cancellation.
        if cancel.is_cancelled() {
            ui.on_phase(
                Phase::DriveSession,
                &PhaseStatus::Failed(MSG_SUBMISSION_CANCELED.to_string()),
            );
            return FlowOutcome::Cancelled(MSG_SUBMISSION_CANCELED.to_string());
        }

        let outcome = self.drive(credentials, &request).await;
        let error = outcome.error().map(|e| e.to_string());
        ui.on_phase(
            Phase::DriveSession,
            &match &error {
                None => PhaseStatus::Succeeded,
                Some(message) => PhaseStatus::Failed(message.clone()),
            },
        );

        let transcript = match &outcome {
            DriveOutcome::Completed(t) => t,
            DriveOutcome::Failed { partial, .. } => partial,
        };
        let report = SubmissionReport {
            attempt_id: Uuid::new_v4().to_string(),
            host: request.target_host.clone(),
            assignment: request.assignment.clone(),
            course: request.course.clone(),
            files: request.manifest.remote_names(),
            started_at: started_at.to_rfc3339(),
            finished_at: Utc::now().to_rfc3339(),
            transcript: transcript.as_str().to_string(),
            completion: transcript.completion(),
            error: error.clone(),
        };

        match error {
            None => {
                info!(
                    "Submitted {} file(s) for {} via {}",
                    report.files.len(),
                    request.target_id(),
                    report.host
                );
                FlowOutcome::Submitted(report)
            }
            Some(message) => {
                warn!(
                    "Files {:?} remain staged on the gateway after the failed session",
                    report.files
                );
                FlowOutcome::Failed {
                    message,
                    report: Some(report),
                }
            }
        }
    }

    /// Ask for credentials until they are usable, then validate them.
    async fn login<U: SubmissionUi + ?Sized>(
        &self,
        ui: &mut U,
        cancel: &CancellationToken,
    ) -> Result<Credentials, Stop> {
        let mut empty_entries = 0;
        let (username, secret) = loop {
            match ui.credentials() {
                None => return Err(Stop::Cancelled(MSG_LOGIN_CANCELED.to_string())),
                Some((username, secret)) => {
                    let secret = Zeroizing::new(secret);
                    let username = username.trim().to_string();
                    let secret = Zeroizing::new(secret.trim().to_string());
                    if username.is_empty() || secret.is_empty() {
                        ui.show(MSG_EMPTY_CREDENTIALS);
                        empty_entries += 1;
                        if empty_entries >= MAX_CREDENTIAL_PROMPTS {
                            warn!("Giving up after {} empty login entries", empty_entries);
                            return Err(Stop::Cancelled(MSG_LOGIN_CANCELED.to_string()));
                        }
                        continue;
                    }
                    break (username, secret);
                }
            }
        };

        let backend = self.backend.clone();
        self.dispatch(ui, cancel, Phase::Authenticate, async move {
            backend.authenticate(&username, &secret).await.into_result()
        })
        .await
    }

    /// Run one pre-driving phase as its own task and notify exactly once.
    async fn dispatch<U, T, F>(
        &self,
        ui: &mut U,
        cancel: &CancellationToken,
        phase: Phase,
        task: F,
    ) -> Result<T, Stop>
    where
        U: SubmissionUi + ?Sized,
        T: Send + 'static,
        F: Future<Output = Result<T, SubmitError>> + Send + 'static,
    {
        if cancel.is_cancelled() {
            ui.on_phase(phase, &PhaseStatus::Failed(MSG_SUBMISSION_CANCELED.to_string()));
            return Err(Stop::Cancelled(MSG_SUBMISSION_CANCELED.to_string()));
        }

        info!("Phase '{}' started", phase);
        let mut handle = tokio::spawn(task);
        let joined = tokio::select! {
            joined = &mut handle => joined,
            _ = cancel.cancelled() => {
                handle.abort();
                warn!("Phase '{}' cancelled", phase);
                ui.on_phase(phase, &PhaseStatus::Failed(MSG_SUBMISSION_CANCELED.to_string()));
                return Err(Stop::Cancelled(MSG_SUBMISSION_CANCELED.to_string()));
            }
        };

        let result = match joined {
            Ok(result) => result,
            Err(e) => Err(phase.task_error(format!("task ended abnormally: {}", e))),
        };

        match result {
            Ok(value) => {
                ui.on_phase(phase, &PhaseStatus::Succeeded);
                Ok(value)
            }
            Err(e) => {
                error!("Phase '{}' failed: {} ({})", phase, e, e.kind());
                ui.on_phase(phase, &PhaseStatus::Failed(e.to_string()));
                Err(Stop::Failed(e))
            }
        }
    }

    /// The driving task. Never cancelled once started.
    async fn drive(&self, credentials: Credentials, request: &SubmissionRequest) -> DriveOutcome {
        info!("Phase '{}' started", Phase::DriveSession);
        let backend = self.backend.clone();
        let task_request = request.clone();
        let joined = tokio::spawn(async move {
            backend.drive_submission(&credentials, &task_request).await
        })
        .await;

        joined.unwrap_or_else(|e| DriveOutcome::Failed {
            partial: Default::default(),
            error: Phase::DriveSession.task_error(format!("task ended abnormally: {}", e)),
        })
    }
}
