//! Remote turnin automation.
//!
//! This module is organized into the following submodules:
//!
//! - `types`: Value types passed between phases (credentials, manifest, request, report)
//! - `config`: Configuration resolution with environment variable support
//! - `error`: Error taxonomy and message classification for retry logic
//! - `session`: russh client handler and connection teardown
//! - `client`: SSH transport, authenticated connections, command execution
//! - `auth`: Password and keyboard-interactive strategies and the retry/fallback machine
//! - `hosts`: Online workstation discovery
//! - `transfer`: SFTP staging of submission files
//! - `transcript`: Control-sequence stripping and the session transcript
//! - `prompt`: Table of prompts the session driver reacts to
//! - `shell`: Interactive PTY shell channel
//! - `driver`: The scripted submission session
//! - `controller`: Phase sequencing for one submission attempt
//! - `logging`: Tracing subscriber setup

pub mod auth;
pub(crate) mod client;
pub mod config;
pub mod controller;
pub mod driver;
pub mod error;
pub mod hosts;
pub mod logging;
pub mod prompt;
pub(crate) mod session;
pub mod shell;
#[cfg(test)]
pub(crate) mod testing;
pub mod transcript;
pub mod transfer;
pub mod types;

pub use auth::{AuthStrategy, Authenticator, FallbackTrigger, InteractiveAuth, PasswordAuth};
pub use config::{ConnectSettings, TurninConfig};
pub use controller::{
    FlowOutcome, Phase, PhaseStatus, SshBackend, SubmissionBackend, SubmissionController,
    SubmissionUi,
};
pub use driver::{DriveOutcome, DriverTimings, SessionDriver};
pub use error::SubmitError;
pub use hosts::{list_online_hosts, parse_online_hosts};
pub use logging::init_tracing;
pub use prompt::{PromptRule, PromptTable, Reply, Stage};
pub use shell::{PtyShell, ShellChannel};
pub use transcript::{Completion, ControlStripper, Transcript, strip_control};
pub use transfer::{RemoteSink, SftpSink, TransferSummary, upload, upload_manifest};
pub use types::{
    AuthOutcome, Credentials, FileSelection, Gateway, ManifestEntry, RemoteHost,
    SubmissionReport, SubmissionRequest, TransferManifest, parse_assignment_course,
};
