//! Configuration resolution for the turnin automation.
//!
//! Values follow a three-tier priority system:
//!
//! 1. **Parameter** - Explicitly provided value (highest priority)
//! 2. **Environment Variable** - Value from environment variable
//! 3. **Default** - Built-in default value (lowest priority)
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TURNIN_GATEWAY` | `scylla.cs.uoi.gr:22` | Gateway `host[:port]` |
//! | `TURNIN_CONNECT_TIMEOUT` | 10s | TCP connect timeout |
//! | `TURNIN_BANNER_TIMEOUT` | 10s | SSH handshake timeout |
//! | `TURNIN_AUTH_TIMEOUT` | 10s | Timeout per authentication exchange |
//! | `TURNIN_COMMAND_TIMEOUT` | 30s | Timeout for `whoami` / status commands |
//! | `TURNIN_SHELL_READY_TIMEOUT` | 30s | Ceiling for the workstation prompt |
//! | `TURNIN_IDLE_WINDOW` | 5s | Silence that marks the turnin command done |
//! | `TURNIN_AUTH_RETRY_DELAY_MS` | 2000ms | Delay between authentication attempts |
//! | `TURNIN_HANDSHAKE_LOG` | `turnin-ssh.log` | russh debug log file |
//! | `TURNIN_STATUS_COMMAND` | `rupt` | Host status report command |
//! | `TURNIN_SUBMIT_COMMAND` | `turnin` | Submission tool |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default gateway address
pub(crate) const DEFAULT_GATEWAY: &str = "scylla.cs.uoi.gr:22";

/// Default TCP connect timeout in seconds
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default SSH banner/handshake timeout in seconds
pub(crate) const DEFAULT_BANNER_TIMEOUT_SECS: u64 = 10;

/// Default authentication timeout in seconds
pub(crate) const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 10;

/// Default remote command timeout in seconds
pub(crate) const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Default ceiling for detecting the workstation shell prompt
pub(crate) const DEFAULT_SHELL_READY_TIMEOUT_SECS: u64 = 30;

/// Default silence window that completes the submission command
pub(crate) const DEFAULT_IDLE_WINDOW_SECS: u64 = 5;

/// Default delay between authentication attempts in milliseconds
pub(crate) const DEFAULT_AUTH_RETRY_DELAY_MS: u64 = 2000;

/// Default path of the russh handshake log
pub(crate) const DEFAULT_HANDSHAKE_LOG: &str = "turnin-ssh.log";

/// Default workstation status command on the gateway
pub(crate) const DEFAULT_STATUS_COMMAND: &str = "rupt";

/// Default submission tool on the workstations
pub(crate) const DEFAULT_SUBMIT_COMMAND: &str = "turnin";

/// Maximum attempts per authentication phase
pub(crate) const MAX_AUTH_ATTEMPTS: u32 = 3;

/// Maximum secret injections while hopping to the workstation
pub(crate) const MAX_SECRET_INJECTIONS: usize = 3;

/// Maximum affirmative replies sent to the submission tool
pub(crate) const MAX_CONFIRMATIONS: usize = 10;

/// Grace period for draining output after `exit`
pub(crate) const DRAIN_GRACE: Duration = Duration::from_secs(1);

pub(crate) const GATEWAY_ENV_VAR: &str = "TURNIN_GATEWAY";
pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "TURNIN_CONNECT_TIMEOUT";
pub(crate) const BANNER_TIMEOUT_ENV_VAR: &str = "TURNIN_BANNER_TIMEOUT";
pub(crate) const AUTH_TIMEOUT_ENV_VAR: &str = "TURNIN_AUTH_TIMEOUT";
pub(crate) const COMMAND_TIMEOUT_ENV_VAR: &str = "TURNIN_COMMAND_TIMEOUT";
pub(crate) const SHELL_READY_TIMEOUT_ENV_VAR: &str = "TURNIN_SHELL_READY_TIMEOUT";
pub(crate) const IDLE_WINDOW_ENV_VAR: &str = "TURNIN_IDLE_WINDOW";
pub(crate) const AUTH_RETRY_DELAY_MS_ENV_VAR: &str = "TURNIN_AUTH_RETRY_DELAY_MS";
pub(crate) const HANDSHAKE_LOG_ENV_VAR: &str = "TURNIN_HANDSHAKE_LOG";
pub(crate) const STATUS_COMMAND_ENV_VAR: &str = "TURNIN_STATUS_COMMAND";
pub(crate) const SUBMIT_COMMAND_ENV_VAR: &str = "TURNIN_SUBMIT_COMMAND";

/// Resolve a value with priority: parameter -> env var -> default.
///
/// Unparsable environment values are ignored.
fn resolve<T: FromStr>(param: Option<T>, env_var: &str, default: T) -> T {
    if let Some(value) = param {
        return value;
    }

    if let Ok(raw) = env::var(env_var)
        && let Ok(value) = raw.trim().parse::<T>()
    {
        return value;
    }

    default
}

/// Resolve a non-empty string setting.
fn resolve_string(param: Option<String>, env_var: &str, default: &str) -> String {
    if let Some(value) = param {
        return value;
    }

    match env::var(env_var) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default.to_string(),
    }
}

pub(crate) fn resolve_gateway(param: Option<String>) -> String {
    resolve_string(param, GATEWAY_ENV_VAR, DEFAULT_GATEWAY)
}

pub(crate) fn resolve_connect_timeout(param: Option<u64>) -> Duration {
    Duration::from_secs(resolve(
        param,
        CONNECT_TIMEOUT_ENV_VAR,
        DEFAULT_CONNECT_TIMEOUT_SECS,
    ))
}

pub(crate) fn resolve_banner_timeout(param: Option<u64>) -> Duration {
    Duration::from_secs(resolve(
        param,
        BANNER_TIMEOUT_ENV_VAR,
        DEFAULT_BANNER_TIMEOUT_SECS,
    ))
}

pub(crate) fn resolve_auth_timeout(param: Option<u64>) -> Duration {
    Duration::from_secs(resolve(param, AUTH_TIMEOUT_ENV_VAR, DEFAULT_AUTH_TIMEOUT_SECS))
}

pub(crate) fn resolve_command_timeout(param: Option<u64>) -> Duration {
    Duration::from_secs(resolve(
        param,
        COMMAND_TIMEOUT_ENV_VAR,
        DEFAULT_COMMAND_TIMEOUT_SECS,
    ))
}

pub(crate) fn resolve_shell_ready_timeout(param: Option<u64>) -> Duration {
    Duration::from_secs(resolve(
        param,
        SHELL_READY_TIMEOUT_ENV_VAR,
        DEFAULT_SHELL_READY_TIMEOUT_SECS,
    ))
}

pub(crate) fn resolve_idle_window(param: Option<u64>) -> Duration {
    Duration::from_secs(resolve(param, IDLE_WINDOW_ENV_VAR, DEFAULT_IDLE_WINDOW_SECS))
}

pub(crate) fn resolve_auth_retry_delay(param: Option<u64>) -> Duration {
    Duration::from_millis(resolve(
        param,
        AUTH_RETRY_DELAY_MS_ENV_VAR,
        DEFAULT_AUTH_RETRY_DELAY_MS,
    ))
}

pub(crate) fn resolve_handshake_log(param: Option<PathBuf>) -> PathBuf {
    param.unwrap_or_else(|| {
        PathBuf::from(resolve_string(
            None,
            HANDSHAKE_LOG_ENV_VAR,
            DEFAULT_HANDSHAKE_LOG,
        ))
    })
}

/// Timeouts shared by every connection the crate opens to the gateway.
#[derive(Debug, Clone)]
pub struct ConnectSettings {
    pub connect_timeout: Duration,
    pub banner_timeout: Duration,
    pub auth_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for ConnectSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            banner_timeout: Duration::from_secs(DEFAULT_BANNER_TIMEOUT_SECS),
            auth_timeout: Duration::from_secs(DEFAULT_AUTH_TIMEOUT_SECS),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
        }
    }
}

/// Fully resolved configuration for one submission flow.
#[derive(Debug, Clone)]
pub struct TurninConfig {
    pub gateway: String,
    pub connect: ConnectSettings,
    pub shell_ready_timeout: Duration,
    pub idle_window: Duration,
    pub auth_retry_delay: Duration,
    pub handshake_log: PathBuf,
    pub status_command: String,
    pub submit_command: String,
}

impl TurninConfig {
    /// Resolve every setting from the environment (after loading `.env`).
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            gateway: resolve_gateway(None),
            connect: ConnectSettings {
                connect_timeout: resolve_connect_timeout(None),
                banner_timeout: resolve_banner_timeout(None),
                auth_timeout: resolve_auth_timeout(None),
                command_timeout: resolve_command_timeout(None),
            },
            shell_ready_timeout: resolve_shell_ready_timeout(None),
            idle_window: resolve_idle_window(None),
            auth_retry_delay: resolve_auth_retry_delay(None),
            handshake_log: resolve_handshake_log(None),
            status_command: resolve_string(None, STATUS_COMMAND_ENV_VAR, DEFAULT_STATUS_COMMAND),
            submit_command: resolve_string(None, SUBMIT_COMMAND_ENV_VAR, DEFAULT_SUBMIT_COMMAND),
        }
    }
}

impl Default for TurninConfig {
    fn default() -> Self {
        Self {
            gateway: DEFAULT_GATEWAY.to_string(),
            connect: ConnectSettings::default(),
            shell_ready_timeout: Duration::from_secs(DEFAULT_SHELL_READY_TIMEOUT_SECS),
            idle_window: Duration::from_secs(DEFAULT_IDLE_WINDOW_SECS),
            auth_retry_delay: Duration::from_millis(DEFAULT_AUTH_RETRY_DELAY_MS),
            handshake_log: PathBuf::from(DEFAULT_HANDSHAKE_LOG),
            status_command: DEFAULT_STATUS_COMMAND.to_string(),
            submit_command: DEFAULT_SUBMIT_COMMAND.to_string(),
        }
    }
}
