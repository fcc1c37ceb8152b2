//! Online workstation discovery.
//!
//! The gateway's status command prints one line per lab workstation,
//! `name status ...`. Only workstations reported `up` can be hopped to.

use tracing::{debug, info};

use super::client::{connect_authenticated, execute_ssh_command};
use super::config::ConnectSettings;
use super::error::SubmitError;
use super::session::close_handle;
use super::transcript::strip_control;
use super::types::{Credentials, Gateway, RemoteHost};

/// Names of the `up` workstations in a status report, in report order.
pub fn parse_online_hosts(report: &str) -> Vec<String> {
    strip_control(report)
        .lines()
        .filter_map(RemoteHost::parse_line)
        .filter(RemoteHost::is_up)
        .map(|host| host.name)
        .collect()
}

/// Ask the gateway which workstations are online right now.
///
/// An empty list means nothing is online and is not an error.
pub async fn list_online_hosts(
    gateway: &Gateway,
    credentials: &Credentials,
    settings: &ConnectSettings,
    status_command: &str,
) -> Result<Vec<String>, SubmitError> {
    let handle = connect_authenticated(gateway, credentials, settings)
        .await
        .map_err(SubmitError::Directory)?;

    let result = execute_ssh_command(&handle, status_command, settings.command_timeout).await;
    close_handle(&handle).await;

    let output = result.map_err(SubmitError::Directory)?;
    if output.timed_out {
        return Err(SubmitError::Directory(format!(
            "'{}' did not finish within {:?}",
            status_command, settings.command_timeout
        )));
    }
    if output.exit_code != 0 {
        debug!(
            "{} exited with {}: {}",
            status_command,
            output.exit_code,
            output.stderr.trim()
        );
    }

    let hosts = parse_online_hosts(&output.stdout);
    info!("{} workstation(s) online", hosts.len());
    Ok(hosts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_keeps_up_hosts_in_order() {
        let report = "wsA up 3\nwsB down 0\nwsC UP 1\n";
        assert_eq!(parse_online_hosts(report), vec!["wsA", "wsC"]);
    }

    #[test]
    fn test_empty_report_is_valid() {
        assert!(parse_online_hosts("").is_empty());
        assert!(parse_online_hosts("wsA down\nwsB down\n").is_empty());
    }

    #[test]
    fn test_ignores_noise_lines() {
        let report = "\x1b[1mwsA\x1b[0m up 12:01, 2 users\r\n\nbroken\nwsD up\n";
        assert_eq!(parse_online_hosts(report), vec!["wsA", "wsD"]);
    }

    #[test]
    fn test_status_must_be_exactly_up() {
        assert!(parse_online_hosts("wsA upgrading 0\nwsB u 0\n").is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_directory_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let gateway = Gateway {
            host: "127.0.0.1".to_string(),
            port,
        };
        let settings = ConnectSettings {
            connect_timeout: Duration::from_secs(2),
            ..ConnectSettings::default()
        };
        let err = list_online_hosts(
            &gateway,
            &Credentials::new("alice", "pw"),
            &settings,
            "rupt",
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "directory_error");
    }
}
