//! # Stagetrack Errors
//!
//! Error taxonomy for the Stagetrack system, one enum per subsystem.
//!
//! Classification follows the recovery policy:
//! - Configuration errors are fatal and surfaced immediately.
//! - Transient remote failures are retried with backoff, then queued for
//!   writes.
//! - Permanent remote failures are surfaced and never queued.
//! - Local-integrity failures (corrupt cache/queue blobs) are treated as
//!   empty state and force a fresh resync.

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;
pub type RemoteResult<T> = Result<T, RemoteError>;
pub type SyncResult<T> = Result<T, SyncError>;

/// Missing or invalid configuration. Never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing credential: {name}")]
    MissingCredential { name: String },

    #[error("Container id not recognized in input: {input}")]
    InvalidContainerId { input: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String }
}

/// Failures from the remote record service or the transport beneath it.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Transport failure: {reason}")]
    Transport { reason: String },

    #[error("Remote returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Malformed response body: {reason}")]
    MalformedBody { reason: String },

    #[error("Retry budget exhausted after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: Box<RemoteError> },

    #[error(transparent)]
    Config(#[from] ConfigError)
}

impl RemoteError {
    /// HTTP statuses worth retrying. Everything else is a permanent failure.
    pub fn status_is_retryable(status: u16) -> bool {
        matches!(status, 408 | 409 | 429 | 500 | 502 | 503 | 504)
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::RateLimited { .. } => true,
            Self::Status { status, .. } => Self::status_is_retryable(*status),
            Self::MalformedBody { .. } | Self::RetryExhausted { .. } | Self::Config(_) => false
        }
    }

    /// Whether a failed write should degrade to the offline queue: every
    /// retryable failure, plus an exhausted retry budget around one.
    pub fn should_queue(&self) -> bool {
        self.is_retryable() || matches!(self, Self::RetryExhausted { .. })
    }

    /// Server-dictated delay, only present on rate-limit responses.
    pub fn retry_after(&self) -> Option<u64> {
        if let Self::RateLimited { retry_after_secs } = self {
            Some(*retry_after_secs)
        } else {
            None
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::MalformedBody {
                reason: err.to_string()
            }
        } else {
            Self::Transport {
                reason: err.to_string()
            }
        }
    }
}

/// Failures of the orchestrating sync layer and snapshot cache.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Local store failure: {reason}")]
    Storage { reason: String },

    /// A failed refresh observed through the single-flight cache. The
    /// originating error is shared between every waiting caller, so this
    /// carries its rendering rather than the value itself.
    #[error("Refresh failed: {reason}")]
    Refresh { reason: String },

    #[error("Scheduler error: {reason}")]
    Scheduler { reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error)
}

impl SyncError {
    /// Write failures that should degrade to "queued" instead of surfacing.
    pub fn is_queueable(&self) -> bool {
        match self {
            Self::Remote(e) => e.should_queue(),
            _ => false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        for status in [408u16, 409, 429, 500, 502, 503, 504] {
            assert!(RemoteError::status_is_retryable(status), "{status}");
        }
        for status in [400u16, 401, 403, 404, 422] {
            assert!(!RemoteError::status_is_retryable(status), "{status}");
        }
    }

    #[test]
    fn test_rate_limit_carries_delay() {
        let err = RemoteError::RateLimited {
            retry_after_secs: 5
        };
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(5));

        let err = RemoteError::Status {
            status: 503,
            message: "unavailable".into()
        };
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn test_exhausted_is_fatal_but_queueable() {
        let err = RemoteError::RetryExhausted {
            attempts: 5,
            last: Box::new(RemoteError::Status {
                status: 503,
                message: String::new()
            })
        };
        assert!(!err.is_retryable());
        assert!(SyncError::Remote(err).is_queueable());

        let fatal = SyncError::Remote(RemoteError::Status {
            status: 404,
            message: String::new()
        });
        assert!(!fatal.is_queueable());
    }
}
