/// Error types surfaced by tasks and manifest handling.
///
/// Most internal code returns `anyhow::Result`; the types here exist so callers
/// (and the executor) can tell transient download failures, structural manifest
/// failures and cancellation apart by downcasting.
use crate::game::remote::Tool;

/// Failures of a single download attempt. All of these are retry-eligible.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("HTTP error {status}: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Content-Length mismatch for {url}: expected {expected} bytes, got {actual}")]
    ContentLengthMismatch {
        url: String,
        expected: u64,
        actual: u64,
    },

    #[error("Size mismatch for {url}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        url: String,
        expected: u64,
        actual: u64,
    },

    #[error("SHA1 mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },
}

/// Structural failures. These are reported to the caller and never retried.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Malformed manifest {source_name}: {reason}")]
    Malformed { source_name: String, reason: String },

    #[error("Manifest {id} is missing required field `{field}`")]
    MissingField { id: String, field: &'static str },

    #[error("Version not found: {id}")]
    VersionNotFound { id: String },

    #[error("No {tool} version {version} available for game version {game_version}")]
    RemoteVersionNotFound {
        tool: Tool,
        game_version: String,
        version: String,
    },
}

impl ManifestError {
    pub fn malformed(source_name: impl Into<String>, reason: impl ToString) -> Self {
        ManifestError::Malformed {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Cooperative cancellation. Treated as a benign termination, never as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Operation cancelled")]
pub struct Cancelled;

/// True when `err` (or anything in its context chain) is a [`Cancelled`].
pub fn is_cancellation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.downcast_ref::<Cancelled>().is_some())
}

/// True for errors that a retry may fix (network, IO and integrity failures).
pub fn is_retryable(err: &anyhow::Error) -> bool {
    if is_cancellation(err) {
        return false;
    }
    !err.chain()
        .any(|cause| cause.downcast_ref::<ManifestError>().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn cancellation_is_detected_through_context() {
        let err = Err::<(), _>(Cancelled)
            .context("Downloading libraries")
            .unwrap_err();
        assert!(is_cancellation(&err));
        assert!(!is_retryable(&err));
    }

    #[test]
    fn manifest_errors_are_not_retryable() {
        let err = anyhow::Error::new(ManifestError::VersionNotFound {
            id: "1.12.2".to_string(),
        });
        assert!(!is_retryable(&err));
        assert!(!is_cancellation(&err));
    }

    #[test]
    fn integrity_errors_are_retryable() {
        let err = anyhow::Error::new(DownloadError::ChecksumMismatch {
            url: "https://example.invalid/a.jar".to_string(),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        });
        assert!(is_retryable(&err));
    }
}
