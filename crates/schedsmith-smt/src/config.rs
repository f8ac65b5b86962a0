//! Solver session configuration

use crate::error::{SmtError, SmtResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the solver subprocess
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Path to the solver executable (auto-detected if None)
    pub binary: Option<PathBuf>,

    /// Arguments putting the solver into interactive SMT-LIB mode
    pub args: Vec<String>,

    /// Where the formula is staged before it is replayed (temp dir if None)
    pub formula_path: Option<PathBuf>,

    /// Longest wait for one response to reach the end marker (default: 5 minutes)
    pub response_timeout: Duration,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            binary: None,
            args: vec!["-smt2".to_string(), "-in".to_string()],
            formula_path: None,
            response_timeout: Duration::from_secs(300),
        }
    }
}

impl SolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the solver executable
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    /// Replace the solver arguments
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Stage formulas at a fixed path
    pub fn with_formula_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.formula_path = Some(path.into());
        self
    }

    /// Set the response timeout
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Configured binary, or `z3` from `PATH`
    pub fn resolve_binary(&self) -> SmtResult<PathBuf> {
        if let Some(binary) = &self.binary {
            return Ok(binary.clone());
        }
        which::which("z3").map_err(|_| {
            SmtError::SolverNotFound(
                "z3 not found in PATH; set the solver binary explicitly".to_string(),
            )
        })
    }
}
