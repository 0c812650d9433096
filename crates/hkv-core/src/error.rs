//! Error types for the hkv core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.
//! Local argument problems never reach the remote system; remote failures carry
//! the error codes reported per batch entry.

use thiserror::Error;

/// Result type alias for hkv operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for hkv.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller supplied an invalid argument (never sent to the remote system)
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    /// Feature is not supported by this adapter
    #[error("Feature not supported: {0}")]
    Unsupported(String),

    /// Remote operation reported non-zero error codes
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Transport failure reported by the RPC capability
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The RPC capability answered with a response of the wrong shape
    #[error("Unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: &'static str,
    },

    /// Client-observed deadline exceeded
    #[error(
        "Failed executing operation for table '{table}', operation_timeout={timeout_ms}ms, wait_time={waited_ms}ms"
    )]
    OperationTimeout {
        table: String,
        timeout_ms: u64,
        waited_ms: u64,
    },

    /// The pending call was cancelled while being waited on
    #[error("Interrupted while executing operation for table '{table}'")]
    Interrupted { table: String },

    /// The call failed with a non-I/O error inside the execution pool
    #[error("Execution failed: {0}")]
    Execution(#[source] Box<Error>),

    /// The private execution pool has been shut down
    #[error("Execution pool for table '{table}' is shut down")]
    PoolShutdown { table: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this failure is rooted in I/O with the remote system.
    ///
    /// The execution wrapper re-raises these unchanged and wraps everything else.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Error::Remote(_)
                | Error::Rpc(_)
                | Error::UnexpectedResponse { .. }
                | Error::OperationTimeout { .. }
                | Error::Interrupted { .. }
                | Error::PoolShutdown { .. }
                | Error::Io(_)
                | Error::Execution(_)
        )
    }

    /// Whether this is the client-side timeout kind.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::OperationTimeout { .. })
    }
}

/// Failure reported by the remote system for a batch of operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("table {table} failed with error code {errno}, error codes {error_codes:?}")]
pub struct RemoteError {
    /// Physical target the batch was sent to
    pub table: String,
    /// Representative code: the first non-zero code in the batch
    pub errno: i32,
    /// Per-entry codes in batch order
    pub error_codes: Vec<i32>,
}

impl RemoteError {
    /// Number of entries that reported a failure.
    pub fn failed_entries(&self) -> usize {
        self.error_codes.iter().filter(|code| **code != 0).count()
    }

    /// Whether some, but not all, entries failed.
    pub fn is_partial(&self) -> bool {
        let failed = self.failed_entries();
        failed > 0 && failed < self.error_codes.len()
    }
}

// Conversion implementations for external error types

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("invalid value".into());
        assert_eq!(err.to_string(), "Configuration error: invalid value");

        let err = Error::Unsupported("multi family is not supported yet.".into());
        assert!(err.to_string().contains("multi family"));
    }

    #[test]
    fn test_remote_error_partial() {
        let err = RemoteError {
            table: "t$cf".into(),
            errno: -4005,
            error_codes: vec![0, -4005, 0],
        };
        assert_eq!(err.failed_entries(), 1);
        assert!(err.is_partial());

        let all = RemoteError {
            table: "t$cf".into(),
            errno: -4005,
            error_codes: vec![-4005, -4005],
        };
        assert!(!all.is_partial());

        let err: Error = err.into();
        assert!(err.to_string().contains("t$cf"));
        assert!(err.is_io());
    }

    #[test]
    fn test_timeout_classification() {
        let err = Error::OperationTimeout {
            table: "t".into(),
            timeout_ms: 10,
            waited_ms: 12,
        };
        assert!(err.is_timeout());
        assert!(err.is_io());
        assert!(err.to_string().contains("wait_time=12ms"));

        assert!(!Error::IllegalArgument("x".into()).is_io());
        assert!(!Error::Unsupported("x".into()).is_timeout());
    }
}
