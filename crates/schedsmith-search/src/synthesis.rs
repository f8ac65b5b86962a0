//! Branch re-synthesis through an external symbolic-execution engine
//!
//! When no recorded trace follows a flipped branch, the engine is asked for
//! new traces: the branch is announced in the flip file, the configured
//! command runs for at most the configured time, and whatever traces it left
//! in the output directory are added to the catalog.

use crate::catalog::TraceCatalog;
use crate::config::SynthesisConfig;
use crate::error::{SearchError, SearchResult};
use schedsmith_trace::ThreadId;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Instant;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

/// Marker the engine prints when the flipped branch is unreachable
const INFEASIBLE_MARKER: &str = "=== error";

/// Result of one synthesis request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisOutcome {
    /// The engine ran; `added` new traces were loaded
    Completed { added: usize },
    /// No feasible execution takes the flipped branch
    Infeasible,
    /// No engine is configured
    Unavailable,
}

/// Produces traces that take a flipped branch
pub trait Synthesizer {
    /// Generate traces of `thread` with branch `position` flipped and add them to `catalog`
    fn synthesize(
        &mut self,
        thread: &ThreadId,
        position: usize,
        catalog: &mut TraceCatalog,
    ) -> SearchResult<SynthesisOutcome>;
}

/// Used when no symbolic-execution engine is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSynthesis;

impl Synthesizer for NoSynthesis {
    fn synthesize(
        &mut self,
        thread: &ThreadId,
        position: usize,
        _catalog: &mut TraceCatalog,
    ) -> SearchResult<SynthesisOutcome> {
        debug!(thread = %thread, position, "No synthesis command configured");
        Ok(SynthesisOutcome::Unavailable)
    }
}

/// Runs the configured shell command
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    config: SynthesisConfig,
    output_dir: PathBuf,
}

impl CommandSynthesizer {
    pub fn new(config: SynthesisConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            output_dir: output_dir.into(),
        }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    fn write_flip_file(&self, thread: &ThreadId, position: usize) -> SearchResult<()> {
        if let Some(parent) = self.config.flip_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = fs::File::create(&self.config.flip_file)?;
        writeln!(file, "{thread} {position}")?;
        debug!(path = %self.config.flip_file.display(), "Wrote flip file");
        Ok(())
    }

    /// Run the command; returns its combined output
    fn run(&self, command: &str) -> SearchResult<String> {
        // Output goes to a file: a full pipe would stall the engine until the timeout
        let capture = tempfile::NamedTempFile::new()?;
        let stdout = capture.reopen()?;
        let stderr = stdout.try_clone()?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|source| SearchError::Synthesis {
            command: command.to_string(),
            source,
        })?;
        match child.wait_timeout(self.config.timeout)? {
            Some(status) => debug!(%status, elapsed = ?started.elapsed(), "Symbolic execution exited"),
            None => {
                info!(timeout = ?self.config.timeout, "Stopping symbolic execution");
                let _ = child.kill();
                let _ = child.wait();
            }
        }

        let output = fs::read_to_string(capture.path())?;
        if let Some(log) = &self.config.log_file {
            fs::write(log, &output)?;
        }
        Ok(output)
    }
}

impl Synthesizer for CommandSynthesizer {
    fn synthesize(
        &mut self,
        thread: &ThreadId,
        position: usize,
        catalog: &mut TraceCatalog,
    ) -> SearchResult<SynthesisOutcome> {
        let Some(command) = self.config.command_line() else {
            return Ok(SynthesisOutcome::Unavailable);
        };
        info!(thread = %thread, position, "Running symbolic execution for flipped branch");
        self.write_flip_file(thread, position)?;
        let output = self.run(&command)?;

        if output.contains(INFEASIBLE_MARKER) {
            info!("No feasible execution found for this branch flip");
            return Ok(SynthesisOutcome::Infeasible);
        }
        if !self.output_dir.is_dir() {
            warn!(dir = %self.output_dir.display(), "Synthesis produced no output directory");
            return Ok(SynthesisOutcome::Completed { added: 0 });
        }
        let added = catalog.load_dir(&self.output_dir)?;
        Ok(SynthesisOutcome::Completed { added })
    }
}
