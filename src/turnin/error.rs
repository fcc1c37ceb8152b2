//! Error taxonomy and transport error classification.
//!
//! Every phase of a submission reports failure through [`SubmitError`]. The
//! authenticator additionally classifies each individual connection attempt
//! as an [`AttemptError`] to decide between retrying, falling back to
//! keyboard-interactive authentication, or failing fast.
//!
//! # Classification Strategy
//!
//! Transport errors are plain messages coming out of russh, tokio and the
//! SFTP client. They are classified by substring:
//!
//! 1. **Missing session**: the server tore the transport down while we were
//!    authenticating. Triggers the keyboard-interactive fallback.
//! 2. **Authentication failures (NOT retryable)**: never retried to avoid
//!    locking the account on the gateway.
//! 3. **Connection errors (retryable)**: transient network issues.
//!
//! ```rust,ignore
//! assert!(is_retryable_error("Connection refused"));
//! assert!(!is_retryable_error("Permission denied"));
//! assert!(indicates_missing_session("No existing session"));
//! ```

use thiserror::Error;

/// Terminal failure of one submission phase.
///
/// The `Display` text is what the UI layer shows to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("Invalid username or password.")]
    InvalidCredentials,

    #[error("Authenticated but unable to verify user.")]
    UnverifiedIdentity,

    #[error("No supported authentication methods.")]
    UnsupportedAuthMethod,

    #[error("Keyboard-interactive authentication failed after {attempts} attempt(s).")]
    InteractiveAuthExhausted { attempts: u32 },

    #[error("SSH error: {0}")]
    Transport(String),

    #[error("Failed to retrieve online hosts: {0}")]
    Directory(String),

    #[error("File transfer failed: {0}")]
    Transfer(String),

    #[error("Remote turnin failed: {0}")]
    SessionAutomation(String),
}

impl SubmitError {
    /// Stable identifier of the error class, used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            SubmitError::InvalidCredentials => "invalid_credentials",
            SubmitError::UnverifiedIdentity => "unverified_identity",
            SubmitError::UnsupportedAuthMethod => "unsupported_auth_method",
            SubmitError::InteractiveAuthExhausted { .. } => "interactive_auth_exhausted",
            SubmitError::Transport(_) => "transport_error",
            SubmitError::Directory(_) => "directory_error",
            SubmitError::Transfer(_) => "transfer_error",
            SubmitError::SessionAutomation(_) => "session_automation_error",
        }
    }
}

/// Outcome of a single failed authentication attempt against the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    /// The server tried the secret and rejected it.
    #[error("credentials rejected by server")]
    Rejected,

    /// The server does not accept the method we tried.
    #[error("authentication method not offered (keyboard-interactive offered: {interactive_offered})")]
    MethodUnavailable { interactive_offered: bool },

    /// Anything that went wrong below the authentication layer.
    #[error("{0}")]
    Transport(String),
}

/// Messages meaning the transport was gone before authentication finished.
const MISSING_SESSION_ERRORS: &[&str] = &[
    "no existing session",
    "session is not active",
    "disconnected",
];

/// Authentication error patterns that indicate permanent failures.
const AUTH_ERRORS: &[&str] = &[
    "authentication failed",
    "password authentication failed",
    "permission denied",
    "auth fail",
    "no authentication",
    "all authentication methods failed",
];

/// Connection error patterns that indicate transient failures.
const RETRYABLE_ERRORS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timed out",
    "timed out",
    "timeout",
    "network is unreachable",
    "no route to host",
    "host is down",
    "temporary failure",
    "resource temporarily unavailable",
    "handshake failed",
    "failed to connect",
    "broken pipe",
    "would block",
];

/// Whether a transport error means "no existing session" on the gateway.
pub(crate) fn indicates_missing_session(error: &str) -> bool {
    let error_lower = error.to_lowercase();
    MISSING_SESSION_ERRORS
        .iter()
        .any(|pattern| error_lower.contains(pattern))
}

/// Determines if an error is retryable (transient) or permanent.
///
/// Authentication failures are checked first and take precedence, so
/// "timeout during authentication failed" is NOT retryable. Messages that
/// match neither list are treated as permanent: the gateway is a known host
/// and unknown protocol errors will not clear up by waiting two seconds.
pub(crate) fn is_retryable_error(error: &str) -> bool {
    let error_lower = error.to_lowercase();

    if AUTH_ERRORS.iter().any(|auth_err| error_lower.contains(auth_err)) {
        return false;
    }

    RETRYABLE_ERRORS
        .iter()
        .any(|retryable_err| error_lower.contains(retryable_err))
}

#[cfg(test)]
mod tests {
    use super::*;

    mod missing_session {
        use super::*;

        #[test]
        fn test_no_existing_session() {
            assert!(indicates_missing_session("No existing session"));
            assert!(indicates_missing_session("SSH error: no existing session"));
        }

        #[test]
        fn test_disconnected() {
            assert!(indicates_missing_session("Disconnected"));
        }

        #[test]
        fn test_unrelated_errors() {
            assert!(!indicates_missing_session("Connection refused"));
            assert!(!indicates_missing_session("Permission denied"));
            assert!(!indicates_missing_session(""));
        }
    }

    mod auth_errors_not_retryable {
        use super::*;

        #[test]
        fn test_authentication_failed() {
            assert!(!is_retryable_error("Authentication failed"));
            assert!(!is_retryable_error("AUTHENTICATION FAILED"));
        }

        #[test]
        fn test_permission_denied() {
            assert!(!is_retryable_error("Permission denied (publickey,password)"));
        }

        #[test]
        fn test_auth_takes_priority_over_connection() {
            assert!(!is_retryable_error("timeout while authentication failed"));
        }
    }

    mod connection_errors_retryable {
        use super::*;

        #[test]
        fn test_connection_refused() {
            assert!(is_retryable_error("Failed to connect: Connection refused (os error 111)"));
        }

        #[test]
        fn test_timeouts() {
            assert!(is_retryable_error("Connection timed out after 10s"));
            assert!(is_retryable_error("SSH handshake timeout"));
        }

        #[test]
        fn test_network_unreachable() {
            assert!(is_retryable_error("Network is unreachable"));
            assert!(is_retryable_error("No route to host"));
        }
    }

    mod unknown_errors {
        use super::*;

        #[test]
        fn test_protocol_error_is_permanent() {
            assert!(!is_retryable_error("Wrong server signature"));
            assert!(!is_retryable_error("Unknown key type"));
        }

        #[test]
        fn test_empty_message() {
            assert!(!is_retryable_error(""));
        }
    }

    mod submit_error {
        use super::*;

        #[test]
        fn test_messages_are_human_readable() {
            assert_eq!(
                SubmitError::InvalidCredentials.to_string(),
                "Invalid username or password."
            );
            assert_eq!(
                SubmitError::InteractiveAuthExhausted { attempts: 3 }.to_string(),
                "Keyboard-interactive authentication failed after 3 attempt(s)."
            );
            assert_eq!(
                SubmitError::SessionAutomation("channel closed".into()).to_string(),
                "Remote turnin failed: channel closed"
            );
        }

        #[test]
        fn test_kinds_are_distinct() {
            let kinds = [
                SubmitError::InvalidCredentials.kind(),
                SubmitError::UnverifiedIdentity.kind(),
                SubmitError::UnsupportedAuthMethod.kind(),
                SubmitError::InteractiveAuthExhausted { attempts: 3 }.kind(),
                SubmitError::Transport(String::new()).kind(),
                SubmitError::Directory(String::new()).kind(),
                SubmitError::Transfer(String::new()).kind(),
                SubmitError::SessionAutomation(String::new()).kind(),
            ];
            let unique: std::collections::HashSet<_> = kinds.iter().collect();
            assert_eq!(unique.len(), kinds.len());
        }
    }
}
