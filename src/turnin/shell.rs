//! Interactive PTY shell on the gateway.
//!
//! The session driver only needs three things from a shell: write bytes, read
//! the next chunk, close. [`ShellChannel`] is that seam; [`PtyShell`] is the
//! russh implementation.

use async_trait::async_trait;
use russh::client;
use russh::{ChannelMsg, ChannelReadHalf, ChannelWriteHalf};
use tracing::debug;

use super::client::connect_authenticated;
use super::config::ConnectSettings;
use super::session::{SshClientHandler, close_handle};
use super::types::{Credentials, Gateway};

/// Terminal type requested for the PTY.
const TERM: &str = "xterm";
const COLS: u32 = 80;
const ROWS: u32 = 24;

/// Byte stream of an interactive shell.
#[async_trait]
pub trait ShellChannel: Send {
    async fn send(&mut self, data: &[u8]) -> Result<(), String>;

    /// Next chunk of output. `None` once the remote side closed the channel.
    async fn recv(&mut self) -> Option<Result<Vec<u8>, String>>;

    async fn close(&mut self);
}

/// Write handle for sending input to a shell channel.
pub struct ChannelWriter {
    write_half: ChannelWriteHalf<client::Msg>,
}

impl ChannelWriter {
    pub fn new(write_half: ChannelWriteHalf<client::Msg>) -> Self {
        Self { write_half }
    }

    /// Send data (text, keystrokes) to the shell.
    pub async fn write(&self, data: &[u8]) -> Result<(), String> {
        self.write_half
            .data(data)
            .await
            .map_err(|e| format!("Failed to write to shell: {}", e))
    }

    /// Close the channel gracefully.
    pub async fn close(&self) -> Result<(), String> {
        self.write_half
            .close()
            .await
            .map_err(|e| format!("Failed to close shell channel: {}", e))
    }
}

/// PTY shell on its own authenticated gateway connection.
pub struct PtyShell {
    handle: client::Handle<SshClientHandler>,
    reader: ChannelReadHalf,
    writer: ChannelWriter,
}

impl PtyShell {
    pub async fn open(
        gateway: &Gateway,
        credentials: &Credentials,
        settings: &ConnectSettings,
    ) -> Result<Self, String> {
        let handle = connect_authenticated(gateway, credentials, settings).await?;

        match Self::start(&handle).await {
            Ok((reader, writer)) => {
                debug!("Interactive shell open on {}", gateway);
                Ok(Self {
                    handle,
                    reader,
                    writer,
                })
            }
            Err(e) => {
                close_handle(&handle).await;
                Err(e)
            }
        }
    }

    async fn start(
        handle: &client::Handle<SshClientHandler>,
    ) -> Result<(ChannelReadHalf, ChannelWriter), String> {
        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| format!("Failed to open channel: {}", e))?;

        channel
            .request_pty(false, TERM, COLS, ROWS, 0, 0, &[])
            .await
            .map_err(|e| format!("Failed to request PTY: {}", e))?;

        channel
            .request_shell(false)
            .await
            .map_err(|e| format!("Failed to start shell: {}", e))?;

        let (reader, write_half) = channel.split();
        Ok((reader, ChannelWriter::new(write_half)))
    }
}

#[async_trait]
impl ShellChannel for PtyShell {
    async fn send(&mut self, data: &[u8]) -> Result<(), String> {
        self.writer.write(data).await
    }

    async fn recv(&mut self) -> Option<Result<Vec<u8>, String>> {
        loop {
            match self.reader.wait().await {
                // A PTY merges stderr into the same stream; keep both.
                Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                    return Some(Ok(data.to_vec()));
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!("Shell exited with status {}", exit_status);
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => return None,
                Some(_) => {}
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.writer.close().await {
            debug!("{}", e);
        }
        close_handle(&self.handle).await;
    }
}
