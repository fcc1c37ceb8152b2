//! SSH client handler for gateway connections.
//!
//! # Architecture
//!
//! - `SshClientHandler`: A russh client handler that accepts all host keys (similar to
//!   `StrictHostKeyChecking=no` in OpenSSH). The gateway is a fixed university host
//!   and the nested hop is made with host key checking disabled as well, so no
//!   known_hosts state is kept by this crate.
//!
//! Handles are never shared across phases: every phase connects, does its work and
//! disconnects through [`close_handle`].

use russh::{Disconnect, client, keys};
use tracing::debug;

/// Client handler for russh that accepts all host keys.
///
/// # Security Note
///
/// Host keys are not verified. Any server answering on the gateway address
/// receives the user's secret.
pub struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!("Accepting gateway host key without verification");
        Ok(true)
    }
}

/// Disconnect a gateway handle, ignoring errors from an already-dead transport.
pub(crate) async fn close_handle(handle: &client::Handle<SshClientHandler>) {
    if let Err(e) = handle
        .disconnect(Disconnect::ByApplication, "turnin phase finished", "en")
        .await
    {
        debug!("Ignoring disconnect error: {}", e);
    }
}
