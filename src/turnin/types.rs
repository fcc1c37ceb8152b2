//! Value types passed between the submission phases.
//!
//! Nothing here is persisted. [`Credentials`] in particular live only for one
//! submission attempt and wipe their secret when dropped.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::client::parse_address;
use super::error::SubmitError;
use super::transcript::Completion;

/// The externally reachable host all traffic is routed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gateway {
    pub host: String,
    pub port: u16,
}

impl Gateway {
    /// Parse a `host[:port]` or `[v6]:port` address, defaulting to port 22.
    pub fn parse(address: &str) -> Result<Self, SubmitError> {
        let (host, port) = parse_address(address).map_err(SubmitError::Transport)?;
        Ok(Self { host, port })
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Username and secret for one submission attempt.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    secret: Zeroizing<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: Zeroizing::new(secret.into()),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &str {
        self.secret.as_str()
    }

    /// Whether `identity` (e.g. `whoami` output) names this user.
    pub fn matches_identity(&self, identity: &str) -> bool {
        identity.trim().eq_ignore_ascii_case(self.username.trim())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Result of one authentication attempt. Exactly one is produced per call.
#[derive(Debug)]
pub enum AuthOutcome {
    Authenticated(Credentials),
    Failed(SubmitError),
}

impl AuthOutcome {
    pub fn into_result(self) -> Result<Credentials, SubmitError> {
        match self {
            AuthOutcome::Authenticated(credentials) => Ok(credentials),
            AuthOutcome::Failed(error) => Err(error),
        }
    }
}

/// One line of the gateway's workstation status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHost {
    pub name: String,
    pub status: String,
}

impl RemoteHost {
    /// Split a status line into name and status; `None` for short lines.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let name = parts.next()?;
        let status = parts.next()?;
        Some(Self {
            name: name.to_string(),
            status: status.to_string(),
        })
    }

    pub fn is_up(&self) -> bool {
        self.status.eq_ignore_ascii_case("up")
    }
}

/// A local file and the name it gets in the gateway home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub local_path: PathBuf,
    pub remote_name: String,
}

/// Ordered list of files to stage on the gateway.
///
/// Remote names are always the local base name. Two local files sharing a
/// base name overwrite each other on the gateway; the later one wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferManifest {
    entries: Vec<ManifestEntry>,
}

impl TransferManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_paths<I, P>(paths: I) -> Result<Self, SubmitError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut manifest = Self::new();
        for path in paths {
            manifest.push(path)?;
        }
        Ok(manifest)
    }

    pub fn push(&mut self, path: impl AsRef<Path>) -> Result<(), SubmitError> {
        let path = path.as_ref();
        let remote_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                SubmitError::Transfer(format!("{} has no file name", path.display()))
            })?;

        self.entries.push(ManifestEntry {
            local_path: path.to_path_buf(),
            remote_name,
        });
        Ok(())
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn remote_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.remote_name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything the session driver needs once the user has chosen a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub assignment: String,
    pub course: String,
    pub target_host: String,
    pub manifest: TransferManifest,
}

impl SubmissionRequest {
    pub fn new(
        assignment: impl Into<String>,
        course: impl Into<String>,
        target_host: impl Into<String>,
        manifest: TransferManifest,
    ) -> Self {
        Self {
            assignment: assignment.into(),
            course: course.into(),
            target_host: target_host.into(),
            manifest,
        }
    }

    /// `assignment@course`, the identifier the submission tool expects.
    pub fn target_id(&self) -> String {
        format!("{}@{}", self.assignment, self.course)
    }

    /// Nested login from the gateway shell to the workstation.
    pub fn hop_command(&self) -> String {
        format!(
            "ssh -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null {}\n",
            shell_words::quote(&self.target_host)
        )
    }

    /// Submission command line, file names shell-quoted.
    pub fn submit_command(&self, tool: &str) -> String {
        let files = shell_words::join(self.manifest.remote_names());
        format!("{} {} {}\n", tool, shell_words::quote(&self.target_id()), files)
    }
}

/// Split user input of the form `assignment@course` on the first `@`.
pub fn parse_assignment_course(input: &str) -> Option<(String, String)> {
    let (assignment, course) = input.split_once('@')?;
    let assignment = assignment.trim();
    let course = course.trim();
    if assignment.is_empty() || course.is_empty() {
        return None;
    }
    Some((assignment.to_string(), course.to_string()))
}

/// The keyed, ordered set of local files chosen in the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSelection {
    files: Vec<(String, PathBuf)>,
}

impl FileSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the file stored under `key`, keeping its position.
    pub fn insert(&mut self, key: impl Into<String>, path: impl Into<PathBuf>) {
        let key = key.into();
        let path = path.into();
        match self.files.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = path,
            None => self.files.push((key, path)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<PathBuf> {
        let index = self.files.iter().position(|(k, _)| k == key)?;
        Some(self.files.remove(index).1)
    }

    pub fn get(&self, key: &str) -> Option<&Path> {
        self.files
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, p)| p.as_path())
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|(_, p)| p.as_path())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn to_manifest(&self) -> Result<TransferManifest, SubmitError> {
        TransferManifest::from_paths(self.paths())
    }
}

/// Final payload handed to the UI sink after a submission attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionReport {
    pub attempt_id: String,
    pub host: String,
    pub assignment: String,
    pub course: String,
    pub files: Vec<String>,
    /// RFC3339 timestamps
    pub started_at: String,
    pub finished_at: String,
    pub transcript: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<Completion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    mod credentials {
        use super::*;

        #[test]
        fn test_debug_redacts_secret() {
            let creds = Credentials::new("alice", "hunter2");
            let debug = format!("{:?}", creds);
            assert!(debug.contains("alice"));
            assert!(!debug.contains("hunter2"));
        }

        #[test]
        fn test_identity_match_is_case_insensitive_and_trimmed() {
            let creds = Credentials::new("Alice", "pw");
            assert!(creds.matches_identity("alice\n"));
            assert!(creds.matches_identity("  ALICE  "));
            assert!(!creds.matches_identity("bob"));
            assert!(!creds.matches_identity(""));
        }
    }

    mod gateway {
        use super::*;

        #[test]
        fn test_parse_default_port() {
            let gw = Gateway::parse("scylla.cs.uoi.gr").unwrap();
            assert_eq!(gw.host, "scylla.cs.uoi.gr");
            assert_eq!(gw.port, 22);
            assert_eq!(gw.to_string(), "scylla.cs.uoi.gr:22");
        }

        #[test]
        fn test_parse_invalid_port() {
            let err = Gateway::parse("gw:abc").unwrap_err();
            assert_eq!(err.kind(), "transport_error");
        }

        #[test]
        fn test_ipv6_gateway_round_trips_display() {
            let gw = Gateway::parse("[::1]:2222").unwrap();
            assert_eq!(gw.host, "::1");
            assert_eq!(gw.to_string(), "[::1]:2222");
        }
    }

    mod remote_host {
        use super::*;

        #[test]
        fn test_parse_line() {
            let host = RemoteHost::parse_line("opti3060ws01   up   3 users").unwrap();
            assert_eq!(host.name, "opti3060ws01");
            assert_eq!(host.status, "up");
            assert!(host.is_up());
        }

        #[test]
        fn test_short_line_is_skipped() {
            assert!(RemoteHost::parse_line("lonely").is_none());
            assert!(RemoteHost::parse_line("   ").is_none());
        }

        #[test]
        fn test_status_is_case_insensitive() {
            assert!(RemoteHost::parse_line("wsC UP 1").unwrap().is_up());
            assert!(!RemoteHost::parse_line("wsB down 0").unwrap().is_up());
        }
    }

    mod manifest {
        use super::*;

        #[test]
        fn test_remote_name_is_base_name() {
            let manifest =
                TransferManifest::from_paths(["/home/a/proj/main.c", "report.pdf"]).unwrap();
            assert_eq!(manifest.remote_names(), vec!["main.c", "report.pdf"]);
            assert_eq!(
                manifest.entries()[0].local_path,
                PathBuf::from("/home/a/proj/main.c")
            );
        }

        #[test]
        fn test_duplicate_base_names_are_kept() {
            let manifest = TransferManifest::from_paths(["a/x.c", "b/x.c"]).unwrap();
            assert_eq!(manifest.len(), 2);
            assert_eq!(manifest.remote_names(), vec!["x.c", "x.c"]);
        }

        #[test]
        fn test_path_without_file_name_is_rejected() {
            let err = TransferManifest::from_paths([".."]).unwrap_err();
            assert_eq!(err.kind(), "transfer_error");
        }
    }

    mod submission_request {
        use super::*;

        fn request(files: &[&str]) -> SubmissionRequest {
            SubmissionRequest::new(
                "ex1",
                "mye023",
                "wsC",
                TransferManifest::from_paths(files.iter().copied()).unwrap(),
            )
        }

        #[test]
        fn test_hop_command() {
            assert_eq!(
                request(&[]).hop_command(),
                "ssh -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null wsC\n"
            );
        }

        #[test]
        fn test_submit_command_quotes_names() {
            let cmd = request(&["/tmp/main.c", "/tmp/my report.pdf"]).submit_command("turnin");
            assert!(cmd.ends_with('\n'));
            assert!(cmd.contains("main.c 'my report.pdf'"));
            assert_eq!(
                shell_words::split(&cmd).unwrap(),
                vec!["turnin", "ex1@mye023", "main.c", "my report.pdf"]
            );
        }
    }

    mod assignment_course {
        use super::*;

        #[test]
        fn test_splits_on_first_at() {
            assert_eq!(
                parse_assignment_course(" ex1 @ mye023@extra "),
                Some(("ex1".to_string(), "mye023@extra".to_string()))
            );
        }

        #[test]
        fn test_rejects_missing_parts() {
            assert_eq!(parse_assignment_course("ex1"), None);
            assert_eq!(parse_assignment_course("@mye023"), None);
            assert_eq!(parse_assignment_course("ex1@  "), None);
        }
    }

    mod file_selection {
        use super::*;

        #[test]
        fn test_insert_replaces_in_place() {
            let mut sel = FileSelection::new();
            sel.insert("compiler", "/a/comp.py");
            sel.insert("source", "/a/test.ci");
            sel.insert("compiler", "/b/comp.py");
            let paths: Vec<_> = sel.paths().collect();
            assert_eq!(paths, vec![Path::new("/b/comp.py"), Path::new("/a/test.ci")]);
        }

        #[test]
        fn test_remove_and_manifest() {
            let mut sel = FileSelection::new();
            sel.insert("source", "/a/test.ci");
            sel.insert("report", "/a/report.pdf");
            assert_eq!(sel.remove("source"), Some(PathBuf::from("/a/test.ci")));
            assert_eq!(sel.to_manifest().unwrap().remote_names(), vec!["report.pdf"]);
        }
    }
}
