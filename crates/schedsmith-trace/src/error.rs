//! Error types for trace parsing and schedule files

use crate::operation::ThreadId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading recorded traces, operation names and solution files
#[derive(Debug, Error)]
pub enum TraceError {
    /// A trace line that does not follow the event grammar
    #[error("{trace}:{line}: malformed event `{text}`")]
    MalformedLine {
        trace: String,
        line: usize,
        text: String,
    },

    /// Join events must name the joined thread
    #[error(
        "{trace}:{line}: join event `{text}` has no child thread id (expected `S-join_<child>-<parent>`)"
    )]
    JoinWithoutChild {
        trace: String,
        line: usize,
        text: String,
    },

    /// Unlock with no open acquisition of the same object by the same thread
    #[error("{trace}:{line}: thread {thread} releases `{object}` without holding it")]
    UnmatchedUnlock {
        trace: String,
        line: usize,
        object: String,
        thread: ThreadId,
    },

    /// An order name that cannot be decoded back into an operation identity
    #[error("malformed operation name `{0}`")]
    MalformedName(String),

    /// Solution or values file with unexpected content
    #[error("{}: {reason}", path.display())]
    MalformedFile { path: PathBuf, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for trace operations
pub type TraceResult<T> = Result<T, TraceError>;
