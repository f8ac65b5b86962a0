//! JSON run configuration
//!
//! Keys are the long option names of the command line, e.g.
//!
//! ```json
//! { "trace-folder": "traces", "with-solver": "/usr/bin/z3", "cortex-d": 3, "csr": true }
//! ```

use anyhow::{Context, Result};
use schedsmith_search::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Every key is optional; present keys override the engine defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub trace_folder: Option<PathBuf>,
    /// Solver executable
    pub with_solver: Option<PathBuf>,
    /// Formula file
    pub model: Option<PathBuf>,
    pub solution: Option<PathBuf>,
    pub alt_sch: Option<PathBuf>,
    /// Candidate traces tried per flipped branch subset
    pub cortex_n: Option<usize>,
    /// Branches closest to the assertion considered for flipping
    pub cortex_d: Option<usize>,
    /// Root-cause search instead of failing-schedule search
    pub dsp_mode: Option<bool>,
    pub csr: Option<bool>,
    pub debug: Option<bool>,
    pub jpf_file: Option<PathBuf>,
    /// Seconds
    pub jpf_timeout: Option<u64>,
    pub synthesis_cmd: Option<String>,
    /// Seconds to wait for one solver answer
    pub solver_timeout: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Keys set in `other` replace ours
    pub fn merge(self, other: FileConfig) -> FileConfig {
        FileConfig {
            trace_folder: other.trace_folder.or(self.trace_folder),
            with_solver: other.with_solver.or(self.with_solver),
            model: other.model.or(self.model),
            solution: other.solution.or(self.solution),
            alt_sch: other.alt_sch.or(self.alt_sch),
            cortex_n: other.cortex_n.or(self.cortex_n),
            cortex_d: other.cortex_d.or(self.cortex_d),
            dsp_mode: other.dsp_mode.or(self.dsp_mode),
            csr: other.csr.or(self.csr),
            debug: other.debug.or(self.debug),
            jpf_file: other.jpf_file.or(self.jpf_file),
            jpf_timeout: other.jpf_timeout.or(self.jpf_timeout),
            synthesis_cmd: other.synthesis_cmd.or(self.synthesis_cmd),
            solver_timeout: other.solver_timeout.or(self.solver_timeout),
        }
    }

    pub fn dsp_mode(&self) -> bool {
        self.dsp_mode.unwrap_or(false)
    }

    pub fn debug(&self) -> bool {
        self.debug.unwrap_or(false)
    }

    /// Engine configuration with the keys that are set applied
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::default();
        if let Some(folder) = &self.trace_folder {
            config.trace_folder = folder.clone();
        }
        if let Some(solver) = &self.with_solver {
            config.solver.binary = Some(solver.clone());
        }
        if let Some(model) = &self.model {
            config.solver.formula_path = Some(model.clone());
        }
        if let Some(secs) = self.solver_timeout {
            config.solver.response_timeout = Duration::from_secs(secs);
        }
        if let Some(solution) = &self.solution {
            config.solution_file = solution.clone();
        }
        config.alternate_file = self.alt_sch.clone();
        if let Some(n) = self.cortex_n {
            // N counts the first pick too
            config.explorer.max_bfs = n.saturating_sub(1);
        }
        if let Some(d) = self.cortex_d {
            config.explorer.max_distance = d;
        }
        if let Some(csr) = self.csr {
            config.csr = csr;
        }
        if let Some(command) = &self.synthesis_cmd {
            config.synthesis.command = Some(command.clone());
        }
        if let Some(jpf_file) = &self.jpf_file {
            config.synthesis.jpf_file = Some(jpf_file.clone());
        }
        if let Some(secs) = self.jpf_timeout {
            config.synthesis.timeout = Duration::from_secs(secs);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_kebab_case_keys() {
        let config: FileConfig = serde_json::from_str(
            r#"{"trace-folder": "t", "with-solver": "/bin/z3", "cortex-n": 3, "cortex-d": 2, "dsp-mode": true, "jpf-timeout": 5}"#,
        )
        .unwrap();
        let engine = config.engine_config();
        assert_eq!(engine.trace_folder, PathBuf::from("t"));
        assert_eq!(engine.solver.binary, Some(PathBuf::from("/bin/z3")));
        assert_eq!(engine.explorer.max_bfs, 2);
        assert_eq!(engine.explorer.max_distance, 2);
        assert_eq!(engine.synthesis.timeout, Duration::from_secs(5));
        assert!(config.dsp_mode());
        assert!(!config.debug());
    }

    #[test]
    fn test_cortex_d_past_mask_width_is_rejected() {
        let config: FileConfig = serde_json::from_str(r#"{"cortex-d": 64}"#).unwrap();
        assert!(config.engine_config().validate().is_err());
        let config: FileConfig = serde_json::from_str(r#"{"cortex-d": 63}"#).unwrap();
        assert!(config.engine_config().validate().is_ok());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(serde_json::from_str::<FileConfig>(r#"{"source": "a.c"}"#).is_err());
    }

    #[test]
    fn test_flags_override_file() {
        let file = FileConfig {
            trace_folder: Some(PathBuf::from("from-file")),
            csr: Some(true),
            ..FileConfig::default()
        };
        let flags = FileConfig {
            trace_folder: Some(PathBuf::from("from-flag")),
            ..FileConfig::default()
        };
        let merged = file.merge(flags);
        assert_eq!(merged.trace_folder, Some(PathBuf::from("from-flag")));
        assert_eq!(merged.csr, Some(true));
    }

    #[test]
    fn test_empty_config_keeps_defaults() {
        let engine = FileConfig::default().engine_config();
        assert_eq!(engine, EngineConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schedsmith.json");
        std::fs::write(&path, r#"{"solution": "out/sol.txt", "alt-sch": "out/alt.txt"}"#).unwrap();
        let engine = FileConfig::load(&path).unwrap().engine_config();
        assert_eq!(engine.values_file(), PathBuf::from("out/sol_values.txt"));
        assert_eq!(engine.alternate_solution_file(), PathBuf::from("out/alt.txt"));

        assert!(FileConfig::load(&dir.path().join("missing.json")).is_err());
    }
}
