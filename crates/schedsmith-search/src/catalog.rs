//! Discovery and loading of recorded trace files
//!
//! Trace files are named `T<tid>_<execution id>_...`; the path id of each
//! trace is the `pathid-...` marker on its last line. The catalog indexes
//! traces by thread and path, keeps one [`PathTrie`] per thread, and
//! remembers which traces were recorded together in one production run.

use crate::error::{SearchError, SearchResult};
use crate::trie::PathTrie;
use schedsmith_trace::{parse_trace_file, ThreadId, TraceCombination, TraceModel};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Path id used when a trace carries no marker
pub const DEFAULT_PATH_ID: &str = "-1";

/// One trace file and what its name and content say about it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub thread: ThreadId,
    pub execution_id: String,
    pub path_id: String,
    pub file: PathBuf,
}

/// `T<tid>_<exec>_...` → (tid, exec)
pub fn parse_trace_file_name(name: &str) -> Option<(ThreadId, String)> {
    let start = name.find('T')? + 1;
    let rest = &name[start..];
    let (thread, rest) = rest.split_once('_')?;
    if thread.is_empty() {
        return None;
    }
    let execution = rest.split('_').next().unwrap_or(rest);
    Some((ThreadId::from(thread), execution.to_string()))
}

/// Path id from the trace's final `pathid-...` line
pub fn read_path_id(text: &str) -> String {
    let Some(last) = text.lines().map(str::trim).filter(|l| !l.is_empty()).last() else {
        return DEFAULT_PATH_ID.to_string();
    };
    last.find("pathid")
        .and_then(|at| {
            let tail = &last[at..];
            tail.find('-').map(|dash| tail[dash..].to_string())
        })
        .unwrap_or_else(|| DEFAULT_PATH_ID.to_string())
}

/// Every known trace, indexed for exploration
#[derive(Debug, Default)]
pub struct TraceCatalog {
    records: BTreeMap<(ThreadId, String), TraceRecord>,
    paths: BTreeMap<ThreadId, Vec<String>>,
    tries: BTreeMap<ThreadId, PathTrie>,
    /// Paths recorded together, by execution id
    production_runs: BTreeMap<String, Vec<(ThreadId, String)>>,
    runs_recorded: bool,
}

impl TraceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the traces in `dir`
    pub fn from_dir(dir: &Path) -> SearchResult<Self> {
        let mut catalog = Self::new();
        catalog.load_dir(dir)?;
        if catalog.is_empty() {
            return Err(SearchError::NoTraces(dir.to_path_buf()));
        }
        Ok(catalog)
    }

    /// Add the traces found in `dir`; returns how many were new
    ///
    /// Production runs are only recorded by the first load; later loads bring
    /// in synthesized traces.
    pub fn load_dir(&mut self, dir: &Path) -> SearchResult<usize> {
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file())
            .collect();
        entries.sort();

        let record_runs = !self.runs_recorded;
        let mut added = 0;
        for file in entries {
            let Some(name) = file.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('.') || !name.contains('T') {
                continue;
            }
            let Some((thread, execution_id)) = parse_trace_file_name(name) else {
                debug!(file = name, "Skipping file without a thread id");
                continue;
            };
            let path_id = read_path_id(&fs::read_to_string(&file)?);
            let record = TraceRecord {
                thread,
                execution_id,
                path_id,
                file,
            };
            if record_runs {
                self.production_runs
                    .entry(record.execution_id.clone())
                    .or_default()
                    .push((record.thread.clone(), record.path_id.clone()));
            }
            if self.record(record) {
                added += 1;
            }
        }
        self.runs_recorded = true;

        for paths in self.paths.values_mut() {
            paths.sort_by_key(String::len);
        }
        info!(
            dir = %dir.display(),
            added,
            threads = self.paths.len(),
            "Loaded traces"
        );
        Ok(added)
    }

    /// Index one trace; false when its (thread, path) is already known
    pub fn record(&mut self, record: TraceRecord) -> bool {
        let key = (record.thread.clone(), record.path_id.clone());
        if self.records.contains_key(&key) {
            debug!(thread = %record.thread, path = %record.path_id, "Trace already known");
            return false;
        }
        self.paths
            .entry(record.thread.clone())
            .or_default()
            .push(record.path_id.clone());
        self.tries
            .entry(record.thread.clone())
            .or_default()
            .insert(&record.path_id);
        self.records.insert(key, record);
        true
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn threads(&self) -> impl Iterator<Item = &ThreadId> {
        self.paths.keys()
    }

    /// Known paths of a thread, shortest first
    pub fn paths(&self, thread: &ThreadId) -> &[String] {
        self.paths.get(thread).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn trie(&self, thread: &ThreadId) -> Option<&PathTrie> {
        self.tries.get(thread)
    }

    pub fn get(&self, thread: &ThreadId, path_id: &str) -> Option<&TraceRecord> {
        self.records.get(&(thread.clone(), path_id.to_string()))
    }

    /// Production runs covering every thread, shortest total path first
    pub fn production_runs(&self) -> Vec<TraceCombination> {
        let threads = self.paths.len();
        let mut runs: Vec<(usize, TraceCombination)> = self
            .production_runs
            .iter()
            .filter_map(|(execution, paths)| {
                let combination: TraceCombination = paths.iter().cloned().collect();
                if combination.len() < threads {
                    debug!(execution, "Skipping incomplete production run");
                    return None;
                }
                Some((path_weight(&combination), combination))
            })
            .collect();
        runs.sort_by_key(|(weight, _)| *weight);
        runs.into_iter().map(|(_, combination)| combination).collect()
    }

    /// Starting point of exploration
    ///
    /// The shortest complete production run; without one, each thread's
    /// shortest known path.
    pub fn initial_combination(&self) -> Option<TraceCombination> {
        if let Some(run) = self.production_runs().into_iter().next() {
            return Some(run);
        }
        let combination: TraceCombination = self
            .paths
            .iter()
            .filter_map(|(thread, paths)| Some((thread.clone(), paths.first()?.clone())))
            .collect();
        if combination.is_empty() {
            None
        } else {
            warn!("No complete production run; starting from the shortest paths");
            Some(combination)
        }
    }

    /// Parse every trace of `combination` into a fresh model
    pub fn load_model(&self, combination: &TraceCombination) -> SearchResult<TraceModel> {
        let mut model = TraceModel::new();
        self.load_into(&mut model, combination)?;
        Ok(model)
    }

    /// Replace `model`'s content with the traces of `combination`
    pub fn load_into(
        &self,
        model: &mut TraceModel,
        combination: &TraceCombination,
    ) -> SearchResult<()> {
        model.reset();
        for (thread, path_id) in combination {
            let record = self
                .get(thread, path_id)
                .ok_or_else(|| SearchError::UnknownTrace {
                    thread: thread.clone(),
                    path: path_id.clone(),
                })?;
            debug!(thread = %thread, path = %path_id, file = %record.file.display(), "Parsing trace");
            parse_trace_file(model, thread, &record.file)?;
        }
        Ok(())
    }
}

/// Total number of branch outcomes in a combination
fn path_weight(combination: &TraceCombination) -> usize {
    combination
        .values()
        .map(|path| path.find('-').map_or(path.len(), |dash| path.len() - dash - 1))
        .sum()
}
