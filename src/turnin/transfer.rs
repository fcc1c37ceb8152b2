//! Staging submission files in the gateway home directory over SFTP.
//!
//! Files are copied in manifest order under their base name. The first
//! failure stops the transfer; files already copied stay on the gateway.

use std::path::Path;

use async_trait::async_trait;
use russh::client;
use russh_sftp::client::SftpSession;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::client::connect_authenticated;
use super::config::ConnectSettings;
use super::error::SubmitError;
use super::session::{SshClientHandler, close_handle};
use super::types::{Credentials, Gateway, TransferManifest};

/// Destination for staged files.
#[async_trait]
pub trait RemoteSink: Send {
    /// Copy one local file to `remote_name`, returning the bytes written.
    async fn put(&mut self, local: &Path, remote_name: &str) -> Result<u64, String>;

    /// Release the channel. Called exactly once, whatever happened before.
    async fn close(&mut self) -> Result<(), String>;
}

/// What a successful upload staged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSummary {
    pub uploaded: Vec<String>,
    pub bytes: u64,
}

/// Copy every manifest entry in order, stopping at the first failure.
pub async fn upload_manifest<S: RemoteSink + ?Sized>(
    sink: &mut S,
    manifest: &TransferManifest,
) -> Result<TransferSummary, SubmitError> {
    let mut summary = TransferSummary::default();
    let mut failure = None;

    for entry in manifest.entries() {
        match sink.put(&entry.local_path, &entry.remote_name).await {
            Ok(bytes) => {
                debug!(
                    "Staged {} as {} ({} bytes)",
                    entry.local_path.display(),
                    entry.remote_name,
                    bytes
                );
                summary.uploaded.push(entry.remote_name.clone());
                summary.bytes += bytes;
            }
            Err(e) => {
                failure = Some(format!("{}: {}", entry.local_path.display(), e));
                break;
            }
        }
    }

    if let Err(e) = sink.close().await {
        warn!("Closing transfer channel failed: {}", e);
    }

    match failure {
        Some(message) => {
            if !summary.uploaded.is_empty() {
                warn!(
                    "Transfer aborted, {} file(s) left on the gateway: {}",
                    summary.uploaded.len(),
                    summary.uploaded.join(", ")
                );
            }
            Err(SubmitError::Transfer(message))
        }
        None => Ok(summary),
    }
}

/// SFTP subsystem channel on an authenticated gateway connection.
pub struct SftpSink {
    handle: client::Handle<SshClientHandler>,
    sftp: SftpSession,
}

impl SftpSink {
    pub async fn open(
        gateway: &Gateway,
        credentials: &Credentials,
        settings: &ConnectSettings,
    ) -> Result<Self, String> {
        let handle = connect_authenticated(gateway, credentials, settings).await?;

        match Self::start_subsystem(&handle).await {
            Ok(sftp) => Ok(Self { handle, sftp }),
            Err(e) => {
                close_handle(&handle).await;
                Err(e)
            }
        }
    }

    async fn start_subsystem(handle: &client::Handle<SshClientHandler>) -> Result<SftpSession, String> {
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| format!("Failed to open channel: {}", e))?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| format!("Failed to request SFTP subsystem: {}", e))?;

        SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| format!("SFTP init failed: {}", e))
    }
}

#[async_trait]
impl RemoteSink for SftpSink {
    async fn put(&mut self, local: &Path, remote_name: &str) -> Result<u64, String> {
        let mut source = tokio::fs::File::open(local)
            .await
            .map_err(|e| format!("cannot read local file: {}", e))?;

        let mut remote = self
            .sftp
            .create(remote_name)
            .await
            .map_err(|e| format!("cannot create remote file: {}", e))?;

        let bytes = tokio::io::copy(&mut source, &mut remote)
            .await
            .map_err(|e| format!("write failed: {}", e))?;

        remote
            .shutdown()
            .await
            .map_err(|e| format!("close failed: {}", e))?;

        Ok(bytes)
    }

    async fn close(&mut self) -> Result<(), String> {
        let result = self.sftp.close().await.map_err(|e| e.to_string());
        close_handle(&self.handle).await;
        result
    }
}

/// Stage the manifest on the gateway over a fresh authenticated connection.
pub async fn upload(
    gateway: &Gateway,
    credentials: &Credentials,
    manifest: &TransferManifest,
    settings: &ConnectSettings,
) -> Result<TransferSummary, SubmitError> {
    let mut sink = SftpSink::open(gateway, credentials, settings)
        .await
        .map_err(SubmitError::Transfer)?;

    let summary = upload_manifest(&mut sink, manifest).await?;
    info!(
        "Uploaded {} file(s), {} bytes to {}",
        summary.uploaded.len(),
        summary.bytes,
        gateway
    );
    Ok(summary)
}
