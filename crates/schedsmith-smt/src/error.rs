//! Error types for constraint generation and the solver protocol

use schedsmith_trace::TraceError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for SMT operations
pub type SmtResult<T> = std::result::Result<T, SmtError>;

/// Errors that can occur while talking to the solver
#[derive(Debug, Error)]
pub enum SmtError {
    /// No solver binary configured and none on `PATH`
    #[error("solver executable not found: {0}")]
    SolverNotFound(String),

    /// The solver process could not be created
    #[error("failed to spawn solver {binary}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The response never reached the end marker
    #[error("solver response did not reach the end marker within {timeout:?}")]
    NoTerminator { timeout: Duration },

    /// The solver closed its output stream mid-query
    #[error("solver exited before finishing the query")]
    SolverExited,

    /// `solve` was called before any formula was staged
    #[error("no formula staged for solving")]
    NotStaged,

    /// Response text that cannot be decoded
    #[error("malformed solver response: {0}")]
    MalformedResponse(String),

    /// Error decoding names or trace data
    #[error(transparent)]
    Trace(#[from] TraceError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SmtError {
    /// The query failed but the search may continue with a fresh solver
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SmtError::NoTerminator { .. } | SmtError::SolverExited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(SmtError::NoTerminator {
            timeout: Duration::from_secs(1)
        }
        .is_recoverable());
        assert!(SmtError::SolverExited.is_recoverable());
        assert!(!SmtError::NotStaged.is_recoverable());
        assert!(!SmtError::SolverNotFound("z3".into()).is_recoverable());
    }

    #[test]
    fn test_error_messages() {
        let err = SmtError::NoTerminator {
            timeout: Duration::from_secs(3),
        };
        assert!(err.to_string().contains("3s"));
        let err: SmtError = TraceError::MalformedName("??".into()).into();
        assert!(err.to_string().contains("??"));
    }
}
