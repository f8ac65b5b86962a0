//! Engine, explorer and synthesis configuration

use crate::error::{SearchError, SearchResult};
use schedsmith_smt::SolverConfig;
use schedsmith_trace::schedule::{alternate_path_for, values_path_for};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest D whose branch subsets still fit a 64-bit mask
pub const MAX_DISTANCE: usize = 63;

/// Bounds of the trace-space search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Number of branches closest to the assertion considered for flipping (D)
    pub max_distance: usize,

    /// Extra breadth-first picks per flipped subset before moving on (N)
    pub max_bfs: usize,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            max_distance: 4,
            max_bfs: 0,
        }
    }
}

impl ExplorerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_distance(mut self, max_distance: usize) -> Self {
        self.max_distance = max_distance;
        self
    }

    pub fn with_max_bfs(mut self, max_bfs: usize) -> Self {
        self.max_bfs = max_bfs;
        self
    }

    pub fn validate(&self) -> SearchResult<()> {
        if self.max_distance > MAX_DISTANCE {
            return Err(SearchError::InvalidConfig(format!(
                "max distance {} exceeds {MAX_DISTANCE}",
                self.max_distance
            )));
        }
        Ok(())
    }
}

/// How new traces are produced for a flipped branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Shell command running the symbolic-execution engine; `{jpf-file}` is
    /// replaced with [`Self::jpf_file`]. No synthesis when None.
    pub command: Option<String>,

    /// Target description handed to the engine
    pub jpf_file: Option<PathBuf>,

    /// Directory the command runs in
    pub working_dir: Option<PathBuf>,

    /// File announcing the branch to flip, as `<tid> <position>`
    pub flip_file: PathBuf,

    /// Where synthesized traces appear (`<trace folder>/sts` if None)
    pub output_dir: Option<PathBuf>,

    /// The engine is stopped after this long (default: 60 seconds)
    pub timeout: Duration,

    /// Captured engine output
    pub log_file: Option<PathBuf>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            command: None,
            jpf_file: None,
            working_dir: None,
            flip_file: PathBuf::from("flipFile.txt"),
            output_dir: None,
            timeout: Duration::from_secs(60),
            log_file: None,
        }
    }
}

impl SynthesisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_jpf_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.jpf_file = Some(path.into());
        self
    }

    pub fn with_working_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(path.into());
        self
    }

    pub fn with_flip_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.flip_file = path.into();
        self
    }

    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Command line with the target substituted
    pub fn command_line(&self) -> Option<String> {
        let command = self.command.as_ref()?;
        let jpf_file = self
            .jpf_file
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_default();
        Some(command.replace("{jpf-file}", &jpf_file))
    }

    /// Output directory for a given trace folder
    pub fn output_dir_for(&self, trace_folder: &Path) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| trace_folder.join("sts"))
    }
}

/// Top-level configuration of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Folder holding the recorded per-thread traces
    pub trace_folder: PathBuf,

    /// Where the failing schedule is written (and read back for root-cause search)
    pub solution_file: PathBuf,

    /// Where the bug-avoiding schedule goes (`<solution stem>ALT.<ext>` if None)
    pub alternate_file: Option<PathBuf>,

    /// Apply context-switch reduction to the schedule found
    pub csr: bool,

    pub solver: SolverConfig,
    pub explorer: ExplorerConfig,
    pub synthesis: SynthesisConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trace_folder: PathBuf::from("traces"),
            solution_file: PathBuf::from("solution.txt"),
            alternate_file: None,
            csr: false,
            solver: SolverConfig::default(),
            explorer: ExplorerConfig::default(),
            synthesis: SynthesisConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new(trace_folder: impl Into<PathBuf>) -> Self {
        Self {
            trace_folder: trace_folder.into(),
            ..Self::default()
        }
    }

    pub fn with_solution_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.solution_file = path.into();
        self
    }

    pub fn with_alternate_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.alternate_file = Some(path.into());
        self
    }

    /// Reject bounds the search cannot represent
    pub fn validate(&self) -> SearchResult<()> {
        self.explorer.validate()
    }

    pub fn with_csr(mut self, csr: bool) -> Self {
        self.csr = csr;
        self
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_explorer(mut self, explorer: ExplorerConfig) -> Self {
        self.explorer = explorer;
        self
    }

    pub fn with_synthesis(mut self, synthesis: SynthesisConfig) -> Self {
        self.synthesis = synthesis;
        self
    }

    /// `<solution stem>_values.txt`
    pub fn values_file(&self) -> PathBuf {
        values_path_for(&self.solution_file)
    }

    /// `<solution stem>ALT.<ext>` unless configured
    pub fn alternate_solution_file(&self) -> PathBuf {
        self.alternate_file
            .clone()
            .unwrap_or_else(|| alternate_path_for(&self.solution_file))
    }

    /// Directory synthesized traces are loaded from
    pub fn synthesis_output_dir(&self) -> PathBuf {
        self.synthesis.output_dir_for(&self.trace_folder)
    }
}
