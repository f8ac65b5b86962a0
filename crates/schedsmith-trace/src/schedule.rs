//! Total orders over operations and their on-disk forms
//!
//! A [`Schedule`] is a sequence of order names. Thread-execution intervals
//! (TEIs) are maximal runs of consecutive positions owned by one thread; the
//! simplifier rearranges whole TEIs.

use crate::error::{TraceError, TraceResult};
use crate::model::TraceCombination;
use crate::operation::{OrderName, ThreadId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io::Write;
use std::ops::Index;
use std::path::{Path, PathBuf};
use tracing::info;

/// One interleaving of all operations of a combination
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schedule(Vec<OrderName>);

impl Schedule {
    pub fn new(ops: Vec<OrderName>) -> Self {
        Self(ops)
    }

    /// Decode a list of order names
    pub fn parse_names<I, S>(names: I) -> TraceResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| OrderName::parse(name.as_ref()))
            .collect::<TraceResult<Vec<_>>>()
            .map(Self)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OrderName> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[OrderName] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<OrderName> {
        self.0
    }

    pub fn get(&self, pos: usize) -> Option<&OrderName> {
        self.0.get(pos)
    }

    fn thread_at(&self, pos: usize) -> &ThreadId {
        self.0[pos].thread()
    }

    /// Number of adjacent positions owned by different threads
    pub fn context_switches(&self) -> usize {
        self.0
            .windows(2)
            .filter(|pair| pair[0].thread() != pair[1].thread())
            .count()
    }

    /// Length of the TEI starting at `start`
    pub fn tei_len(&self, start: usize) -> usize {
        let thread = self.thread_at(start);
        1 + self.0[start + 1..]
            .iter()
            .take_while(|op| op.thread() == thread)
            .count()
    }

    /// `pos` ends a TEI that is followed by another thread's operation
    pub fn is_last_of_tei(&self, pos: usize) -> bool {
        pos + 1 < self.0.len() && self.thread_at(pos) != self.thread_at(pos + 1)
    }

    /// Next position after `pos` owned by the same thread
    pub fn next_in_thread(&self, pos: usize) -> Option<usize> {
        let thread = self.thread_at(pos);
        self.0[pos + 1..]
            .iter()
            .position(|op| op.thread() == thread)
            .map(|offset| pos + 1 + offset)
    }

    /// Move the TEI starting at `from` to sit right after position `after`
    ///
    /// Requires `after < from`.
    pub fn move_tei(&self, after: usize, from: usize) -> Schedule {
        let len = self.tei_len(from);
        let mut ops = self.0.clone();
        let tei: Vec<OrderName> = ops.drain(from..from + len).collect();
        let at = after + 1;
        ops.splice(at..at, tei);
        Schedule(ops)
    }

    pub fn reversed(&self) -> Schedule {
        Schedule(self.0.iter().rev().cloned().collect())
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }

    /// Indented per-thread rendering for logs
    pub fn pretty(&self) -> PrettySchedule<'_> {
        PrettySchedule(self)
    }
}

impl Index<usize> for Schedule {
    type Output = OrderName;

    fn index(&self, pos: usize) -> &OrderName {
        &self.0[pos]
    }
}

impl FromIterator<OrderName> for Schedule {
    fn from_iter<I: IntoIterator<Item = OrderName>>(iter: I) -> Self {
        Schedule(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Schedule {
    type Item = &'a OrderName;
    type IntoIter = std::slice::Iter<'a, OrderName>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// See [`Schedule::pretty`]
pub struct PrettySchedule<'a>(&'a Schedule);

impl fmt::Display for PrettySchedule<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let schedule = self.0;
        writeln!(f, "Schedule size: {}", schedule.len())?;
        writeln!(f, "Schedule contextSwitches: {}", schedule.context_switches())?;
        let mut columns: HashMap<&ThreadId, usize> = HashMap::new();
        for (i, op) in schedule.iter().enumerate() {
            let next = columns.len();
            let column = *columns.entry(op.thread()).or_insert(next);
            writeln!(f, "{}[{i}] {op}", "\t".repeat(column))?;
        }
        Ok(())
    }
}

/// A schedule together with the combination it was found for
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SolutionFile {
    pub combination: TraceCombination,
    pub schedule: Schedule,
}

impl SolutionFile {
    pub fn new(combination: TraceCombination, schedule: Schedule) -> Self {
        Self {
            combination,
            schedule,
        }
    }

    /// Write `<tid><path>` lines followed by one order name per line
    pub fn save(&self, path: &Path) -> TraceResult<()> {
        info!(path = %path.display(), "saving schedule");
        let mut out = fs::File::create(path)?;
        for (thread, path_id) in &self.combination {
            writeln!(out, "<{thread}{path_id}>")?;
        }
        for op in &self.schedule {
            writeln!(out, "{op}")?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> TraceResult<Self> {
        let text = fs::read_to_string(path)?;
        let malformed = |reason: String| TraceError::MalformedFile {
            path: path.to_path_buf(),
            reason,
        };
        let mut combination = TraceCombination::new();
        let mut names = Vec::new();
        for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
            if let Some(entry) = line.strip_prefix('<') {
                let entry = entry.trim_end_matches('>');
                let split = entry
                    .find('-')
                    .ok_or_else(|| malformed(format!("combination entry `{line}` has no path id")))?;
                let (thread, path_id) = entry.split_at(split);
                combination.insert(ThreadId::from(thread), path_id.to_string());
            } else {
                names.push(
                    OrderName::parse(line).map_err(|_| malformed(format!("bad operation `{line}`")))?,
                );
            }
        }
        Ok(Self {
            combination,
            schedule: Schedule(names),
        })
    }
}

/// `<dir>/<stem>_values.txt` next to a solution file
pub fn values_path_for(solution: &Path) -> PathBuf {
    let stem = solution
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    solution.with_file_name(format!("{stem}_values.txt"))
}

/// `<dir>/<stem>ALT.<ext>`, where the alternate schedule is stored
pub fn alternate_path_for(solution: &Path) -> PathBuf {
    let stem = solution
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match solution.extension() {
        Some(ext) => format!("{stem}ALT.{}", ext.to_string_lossy()),
        None => format!("{stem}ALT"),
    };
    solution.with_file_name(name)
}

/// Write alternating name / value lines
pub fn save_values(path: &Path, values: &BTreeMap<String, String>) -> TraceResult<()> {
    let mut out = fs::File::create(path)?;
    for (name, value) in values {
        writeln!(out, "{name}\n{value}")?;
    }
    out.flush()?;
    Ok(())
}

pub fn load_values(path: &Path) -> TraceResult<BTreeMap<String, String>> {
    let text = fs::read_to_string(path)?;
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() % 2 != 0 {
        return Err(TraceError::MalformedFile {
            path: path.to_path_buf(),
            reason: format!("odd number of lines ({})", lines.len()),
        });
    }
    Ok(lines
        .chunks(2)
        .map(|pair| (pair[0].to_string(), pair[1].to_string()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sched(layout: &[(&str, u32)]) -> Schedule {
        layout
            .iter()
            .map(|(tid, i)| OrderName::parse(&format!("OR-x-{tid}-{i}&a.c@{i}")).unwrap())
            .collect()
    }

    fn threads(s: &Schedule) -> String {
        s.iter().map(|op| op.thread().as_str()).collect()
    }

    #[test]
    fn test_context_switches() {
        assert_eq!(sched(&[]).context_switches(), 0);
        assert_eq!(sched(&[("1", 0)]).context_switches(), 0);
        let s = sched(&[("1", 0), ("1", 1), ("2", 0), ("1", 2), ("2", 1)]);
        assert_eq!(s.context_switches(), 3);
    }

    #[test]
    fn test_tei_navigation() {
        let s = sched(&[("1", 0), ("1", 1), ("2", 0), ("2", 1), ("1", 2)]);
        assert_eq!(s.tei_len(0), 2);
        assert_eq!(s.tei_len(2), 2);
        assert!(!s.is_last_of_tei(0));
        assert!(s.is_last_of_tei(1));
        assert!(!s.is_last_of_tei(4));
        assert_eq!(s.next_in_thread(1), Some(4));
        assert_eq!(s.next_in_thread(4), None);
    }

    #[test]
    fn test_move_tei() {
        let s = sched(&[("1", 0), ("2", 0), ("2", 1), ("1", 1), ("1", 2), ("2", 2)]);
        let moved = s.move_tei(0, 3);
        assert_eq!(threads(&moved), "111222");
        assert_eq!(moved.len(), s.len());
        assert_eq!(moved.context_switches(), 1);
    }

    #[test]
    fn test_pretty_indents_by_thread() {
        let s = sched(&[("1", 0), ("2", 0)]);
        let text = s.pretty().to_string();
        assert!(text.starts_with("Schedule size: 2\nSchedule contextSwitches: 1\n"));
        assert!(text.contains("[0] OR-x-1-0&a.c@0\n"));
        assert!(text.contains("\t[1] OR-x-2-0&a.c@0\n"));
    }

    #[test]
    fn test_solution_file_keeps_every_operation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("solution.txt");
        let mut combination = TraceCombination::new();
        combination.insert(ThreadId::from("1"), "-10".to_string());
        combination.insert(ThreadId::from("2"), "-1".to_string());
        let file = SolutionFile::new(
            combination,
            Schedule::parse_names(["OS-start-2&a.c@1", "OR-x-1-0&a.c@2", "OS-exit-1&a.c@3"])
                .unwrap(),
        );
        file.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("<1-10>\n<2-1>\n"));
        assert_eq!(SolutionFile::load(&path).unwrap(), file);
    }

    #[test]
    fn test_solution_file_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, "OR-x-1-0&a.c@2\nnot an op\n").unwrap();
        assert!(matches!(
            SolutionFile::load(&path),
            Err(TraceError::MalformedFile { .. })
        ));
    }

    #[test]
    fn test_values_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v.txt");
        let mut values = BTreeMap::new();
        values.insert("R-x-1-0".to_string(), "5".to_string());
        values.insert("InitR-x-1".to_string(), "-3".to_string());
        save_values(&path, &values).unwrap();
        assert_eq!(load_values(&path).unwrap(), values);

        fs::write(&path, "R-x-1-0\n").unwrap();
        assert!(load_values(&path).is_err());
    }

    #[test]
    fn test_derived_paths() {
        let solution = Path::new("/tmp/out/failing.txt");
        assert_eq!(
            values_path_for(solution),
            Path::new("/tmp/out/failing_values.txt")
        );
        assert_eq!(
            alternate_path_for(solution),
            Path::new("/tmp/out/failingALT.txt")
        );
        assert_eq!(
            values_path_for(&alternate_path_for(solution)),
            Path::new("/tmp/out/failingALT_values.txt")
        );
    }
}
