//! Error types for exploration, synthesis and the engine loops

use schedsmith_smt::SmtError;
use schedsmith_trace::{ThreadId, TraceError};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors raised while searching for a schedule
#[derive(Debug, Error)]
pub enum SearchError {
    /// The trace folder holds no usable trace files
    #[error("no traces found in {}", .0.display())]
    NoTraces(PathBuf),

    /// A combination names a path the catalog has no trace for
    #[error("no trace recorded for thread {thread} path {path}")]
    UnknownTrace { thread: ThreadId, path: String },

    /// The traces of a combination admit no schedule at all
    #[error("no feasible schedule for the current trace combination")]
    NoFeasibleSchedule,

    /// Search bounds out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A solution file without its trace combination
    #[error("solution file {} names no trace combination", .0.display())]
    MissingCombination(PathBuf),

    /// The synthesis command could not be started
    #[error("failed to run synthesis command `{command}`: {source}")]
    Synthesis {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Trace parsing or schedule file error
    #[error(transparent)]
    Trace(#[from] TraceError),

    /// Solver protocol error
    #[error(transparent)]
    Smt(#[from] SmtError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
