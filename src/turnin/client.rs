//! SSH transport and command execution against the gateway.
//!
//! ## Connection Lifecycle
//!
//! 1. **Address Parsing**: Parse the gateway address into host and port components.
//!    Supports `host:port` format with default port 22 if not specified.
//!
//! 2. **Client Configuration**: Build the russh client configuration with an
//!    inactivity timeout and keepalives.
//!
//! 3. **Transport**: Open a brand-new TCP socket (connect timeout) and run the SSH
//!    handshake over it (banner timeout). Nothing is pooled: keyboard-interactive
//!    authentication is stateful and must never reuse a transport that failed.
//!
//! 4. **Authentication**: Password first; keyboard-interactive answered with the
//!    same secret when the gateway only offers that (see [`connect_authenticated`]).
//!
//! 5. **Command Execution**: Execute one command on a fresh channel and collect
//!    stdout, stderr, and exit code.

use std::sync::Arc;
use std::time::Duration;

use russh::{ChannelMsg, client};
use tracing::{debug, info, warn};

use super::auth::{InteractiveAuth, PasswordAuth};
use super::config::ConnectSettings;
use super::error::{AttemptError, indicates_missing_session};
use super::session::SshClientHandler;
use super::types::{Credentials, Gateway};

/// Build russh client configuration.
///
/// Keepalive every 30 seconds with max 3 keepalives, and an inactivity timeout
/// so a gateway that stops answering cannot hang a phase forever.
pub(crate) fn build_client_config(inactivity_timeout: Duration) -> Arc<client::Config> {
    Arc::new(client::Config {
        inactivity_timeout: Some(inactivity_timeout),
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        ..Default::default()
    })
}

/// Split a gateway address into host and port.
///
/// Accepted forms: `host`, `host:port`, `[v6]`, `[v6]:port` and a bare IPv6
/// literal. The port defaults to 22. Brackets are removed from the host so it
/// can be handed to the resolver as is.
pub(crate) fn parse_address(address: &str) -> Result<(String, u16), String> {
    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| format!("Unterminated IPv6 address: {}", address))?;
        let port = match tail.strip_prefix(':') {
            Some(port_str) => parse_port(port_str)?,
            None if tail.is_empty() => 22,
            None => return Err(format!("Unexpected text after IPv6 address: {}", tail)),
        };
        return Ok((host.to_string(), port));
    }

    match address.rsplit_once(':') {
        // More than one colon without brackets: a bare IPv6 literal.
        Some((host, _)) if host.contains(':') => Ok((address.to_string(), 22)),
        Some((host, port_str)) => Ok((host.to_string(), parse_port(port_str)?)),
        None => Ok((address.to_string(), 22)),
    }
}

fn parse_port(port_str: &str) -> Result<u16, String> {
    port_str
        .parse::<u16>()
        .map_err(|e| format!("Invalid port number: {}", e))
}

/// Open a new TCP socket to the gateway and complete the SSH handshake.
pub(crate) async fn open_transport(
    gateway: &Gateway,
    settings: &ConnectSettings,
) -> Result<client::Handle<SshClientHandler>, String> {
    let stream = tokio::time::timeout(
        settings.connect_timeout,
        tokio::net::TcpStream::connect((gateway.host.as_str(), gateway.port)),
    )
    .await
    .map_err(|_| format!("Connection timed out after {:?}", settings.connect_timeout))?
    .map_err(|e| format!("Failed to connect: {}", e))?;

    debug!("TCP connected to {}", gateway);

    // The inactivity timeout has to outlive the longest quiet stretch of a phase,
    // which is the shell-ready ceiling while hopping to the workstation.
    let config = build_client_config(settings.command_timeout.max(Duration::from_secs(60)));

    let handle = tokio::time::timeout(
        settings.banner_timeout,
        client::connect_stream(config, stream, SshClientHandler),
    )
    .await
    .map_err(|_| format!("SSH handshake timeout after {:?}", settings.banner_timeout))?
    .map_err(|e| format!("SSH handshake failed: {}", e))?;

    debug!("SSH handshake with {} complete", gateway);
    Ok(handle)
}

/// Open an authenticated connection for a phase after the credentials were validated.
///
/// Tries password authentication and, when the gateway only offers
/// keyboard-interactive (or drops the session mid-authentication), repeats the
/// login on a fresh transport answering every prompt with the secret.
pub(crate) async fn connect_authenticated(
    gateway: &Gateway,
    credentials: &Credentials,
    settings: &ConnectSettings,
) -> Result<client::Handle<SshClientHandler>, String> {
    let password = PasswordAuth::new(settings.clone());
    match password.login(gateway, credentials).await {
        Ok(handle) => Ok(handle),
        Err(AttemptError::MethodUnavailable {
            interactive_offered: true,
        }) => {
            info!("Gateway {} wants keyboard-interactive authentication", gateway);
            login_interactive(gateway, credentials, settings).await
        }
        Err(AttemptError::Transport(e)) if indicates_missing_session(&e) => {
            warn!("Session dropped during password authentication: {}", e);
            login_interactive(gateway, credentials, settings).await
        }
        Err(e) => Err(e.to_string()),
    }
}

async fn login_interactive(
    gateway: &Gateway,
    credentials: &Credentials,
    settings: &ConnectSettings,
) -> Result<client::Handle<SshClientHandler>, String> {
    InteractiveAuth::new(settings.clone())
        .login(gateway, credentials)
        .await
        .map_err(|e| e.to_string())
}

/// Collected result of a single remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

/// Execute a command on a fresh session channel with timeout support.
///
/// If the command times out, returns partial output with `timed_out: true`
/// instead of an error. Returns -1 as exit code if the server did not send one.
pub(crate) async fn execute_ssh_command(
    handle: &client::Handle<SshClientHandler>,
    command: &str,
    timeout: Duration,
) -> Result<CommandOutput, String> {
    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(|e| format!("Failed to open channel: {}", e))?;

    channel
        .exec(true, command)
        .await
        .map_err(|e| format!("Failed to execute command: {}", e))?;

    let mut stdout = Vec::with_capacity(1024);
    let mut stderr = Vec::new();
    let mut exit_code: Option<u32> = None;

    let result = tokio::time::timeout(timeout, async {
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    stdout.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    // ext == 1 is stderr in SSH protocol
                    if ext == 1 {
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    exit_code = Some(exit_status);
                }
                Some(ChannelMsg::Eof) => {
                    if exit_code.is_some() {
                        break;
                    }
                }
                Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }
    })
    .await;

    let timed_out = result.is_err();
    if timed_out {
        warn!(
            "Command '{}' timed out after {:?}, returning partial output ({} bytes)",
            command,
            timeout,
            stdout.len()
        );
    }

    let _ = channel.close().await;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code: exit_code.map(|c| c as i32).unwrap_or(-1),
        timed_out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    mod address_parsing {
        use super::*;

        #[test]
        fn test_hostname_with_port() {
            let (host, port) = parse_address("scylla.cs.uoi.gr:2222").unwrap();
            assert_eq!(host, "scylla.cs.uoi.gr");
            assert_eq!(port, 2222);
        }

        #[test]
        fn test_host_without_port_defaults_to_22() {
            let (host, port) = parse_address("192.168.1.1").unwrap();
            assert_eq!(host, "192.168.1.1");
            assert_eq!(port, 22);
        }

        #[test]
        fn test_invalid_port_returns_error() {
            let result = parse_address("example.com:invalid");
            assert!(result.unwrap_err().contains("Invalid port number"));
        }

        #[test]
        fn test_port_out_of_range() {
            assert!(parse_address("example.com:99999").is_err());
        }

        #[test]
        fn test_bracketed_ipv6_is_unwrapped() {
            assert_eq!(parse_address("[::1]:2222").unwrap(), ("::1".to_string(), 2222));
            assert_eq!(parse_address("[fe80::1]").unwrap(), ("fe80::1".to_string(), 22));
        }

        #[test]
        fn test_bare_ipv6_defaults_to_22() {
            assert_eq!(parse_address("::1").unwrap(), ("::1".to_string(), 22));
        }

        #[test]
        fn test_malformed_ipv6() {
            assert!(parse_address("[::1").unwrap_err().contains("Unterminated"));
            assert!(parse_address("[::1]x").is_err());
            assert!(parse_address("[::1]:abc").unwrap_err().contains("Invalid port number"));
        }

        #[tokio::test]
        async fn test_unwrapped_ipv6_host_resolves() {
            let (host, port) = parse_address("[::1]:22").unwrap();
            let resolved = tokio::net::lookup_host((host.as_str(), port)).await;
            assert!(resolved.is_ok());
        }
    }

    mod client_config {
        use super::*;

        #[test]
        fn test_builds_config_with_timeout() {
            let config = build_client_config(Duration::from_secs(45));
            assert_eq!(config.inactivity_timeout, Some(Duration::from_secs(45)));
        }

        #[test]
        fn test_builds_config_with_keepalive() {
            let config = build_client_config(Duration::from_secs(30));
            assert_eq!(config.keepalive_interval, Some(Duration::from_secs(30)));
            assert_eq!(config.keepalive_max, 3);
        }
    }

    mod transport {
        use super::*;

        #[tokio::test]
        async fn test_refused_connection_is_reported() {
            // Bind then drop a listener so the port is very likely closed.
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            let port = listener.local_addr().unwrap().port();
            drop(listener);

            let gateway = Gateway {
                host: "127.0.0.1".to_string(),
                port,
            };
            let err = open_transport(&gateway, &ConnectSettings::default())
                .await
                .err()
                .unwrap();
            assert!(err.starts_with("Failed to connect"), "{}", err);
        }
    }
}
