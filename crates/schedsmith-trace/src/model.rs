//! Operation sets of one trace combination
//!
//! A [`TraceModel`] is filled by the parser (one trace per thread), read by the
//! constraint generator, and reset before the next combination is loaded.

use crate::operation::{OpKind, Operation, OrderName, SourceLoc, ThreadId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Expression syntax used by the recording tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// KLEE-style KQuery s-expressions
    #[default]
    KQuery,
    /// Java PathFinder infix expressions
    Jpf,
}

/// Closing half of a [`LockPair`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub loc: SourceLoc,
    /// Synthesized because the trace ended inside the critical section
    pub fake: bool,
}

/// One outermost critical section of one thread
///
/// Lock and unlock share `instance`, so their order names can be correlated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockPair {
    pub thread: ThreadId,
    pub object: String,
    pub instance: u32,
    pub lock_loc: SourceLoc,
    pub release: Option<Release>,
}

impl LockPair {
    pub fn lock_op(&self) -> Operation {
        Operation::new(
            self.thread.clone(),
            self.object.clone(),
            self.instance,
            self.lock_loc.clone(),
            OpKind::LockAcquire,
        )
    }

    pub fn release_op(&self) -> Option<Operation> {
        self.release.as_ref().map(|release| {
            Operation::new(
                self.thread.clone(),
                self.object.clone(),
                self.instance,
                release.loc.clone(),
                OpKind::LockRelease { fake: release.fake },
            )
        })
    }

    pub fn lock_name(&self) -> OrderName {
        self.lock_op().order_name()
    }

    pub fn unlock_name(&self) -> Option<OrderName> {
        self.release_op().map(|op| op.order_name())
    }
}

/// Chosen path id per thread
pub type TraceCombination = BTreeMap<ThreadId, String>;

/// Key under which a combination is remembered as tested
pub fn combination_key(combination: &TraceCombination) -> String {
    combination.values().map(String::as_str).collect()
}

/// All operations of the traces in one combination, grouped the ways the
/// constraint generator consumes them
#[derive(Debug, Clone, Default)]
pub struct TraceModel {
    /// Program order of every thread; excludes calls and path conditions
    pub ops_by_thread: BTreeMap<ThreadId, Vec<Operation>>,
    /// Reads by variable
    pub reads: BTreeMap<String, Vec<Operation>>,
    /// Writes by variable
    pub writes: BTreeMap<String, Vec<Operation>>,
    /// Lock pairs by lock object, in completion order
    pub lock_pairs: BTreeMap<String, Vec<LockPair>>,
    /// Forks by parent thread
    pub forks: BTreeMap<ThreadId, Vec<Operation>>,
    /// Joins by parent thread
    pub joins: BTreeMap<ThreadId, Vec<Operation>>,
    pub starts: BTreeMap<ThreadId, Operation>,
    /// Terminal event of each thread (`exit`, or `Assert` for the assertion thread)
    pub exits: BTreeMap<ThreadId, Operation>,
    /// Waits by condition object
    pub waits: BTreeMap<String, Vec<Operation>>,
    /// Signals by condition object
    pub signals: BTreeMap<String, Vec<Operation>>,
    /// Barrier arrivals by barrier object
    pub barriers: BTreeMap<String, Vec<Operation>>,
    pub other_syncs: Vec<Operation>,
    /// Path conditions grouped by thread, in recording order
    pub path_conditions: Vec<Operation>,
    pub calls: Vec<Operation>,
    pub assert_thread: Option<ThreadId>,
    /// The recorded run of the assertion thread failed
    pub failed_execution: bool,
    pub dialect: Dialect,
}

impl TraceModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything parsed so far
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Number of operations taking part in the global order
    pub fn total_ops(&self) -> usize {
        self.ops_by_thread.values().map(Vec::len).sum()
    }

    pub fn thread_ops(&self, thread: &ThreadId) -> &[Operation] {
        self.ops_by_thread
            .get(thread)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn threads(&self) -> impl Iterator<Item = &ThreadId> {
        self.ops_by_thread.keys()
    }

    /// Look up the operation behind an order name
    pub fn find(&self, name: &OrderName) -> Option<&Operation> {
        self.thread_ops(name.thread())
            .iter()
            .find(|op| op.order_name() == *name)
    }

    /// Append to the thread's program order
    pub(crate) fn push_op(&mut self, op: Operation) {
        self.ops_by_thread
            .entry(op.thread.clone())
            .or_default()
            .push(op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(thread: &str, instance: u32, fake: Option<bool>) -> LockPair {
        LockPair {
            thread: ThreadId::from(thread),
            object: "m".to_string(),
            instance,
            lock_loc: SourceLoc::new("a.c", 10),
            release: fake.map(|fake| Release {
                loc: SourceLoc::new("a.c", 14),
                fake,
            }),
        }
    }

    #[test]
    fn test_lock_pair_names_share_instance() {
        let p = pair("2", 1, Some(false));
        assert_eq!(p.lock_name().as_str(), "OS-lock_m-2-1&a.c@10");
        assert_eq!(
            p.unlock_name().unwrap().as_str(),
            "OS-unlock_m-2-1&a.c@14"
        );
    }

    #[test]
    fn test_open_lock_pair_has_no_unlock() {
        assert!(pair("2", 0, None).unlock_name().is_none());
        let fake = pair("2", 0, Some(true));
        assert!(fake.unlock_name().unwrap().as_str().starts_with("OS-unlockFake_m"));
    }

    #[test]
    fn test_combination_key_concatenates_paths() {
        let mut comb = TraceCombination::new();
        comb.insert(ThreadId::from("1"), "-10".to_string());
        comb.insert(ThreadId::from("0"), "-1".to_string());
        assert_eq!(combination_key(&comb), "-1-10");
    }

    #[test]
    fn test_dialect_serde_names() {
        assert_eq!(serde_json::to_string(&Dialect::Jpf).unwrap(), "\"jpf\"");
        let dialect: Dialect = serde_json::from_str("\"kquery\"").unwrap();
        assert_eq!(dialect, Dialect::KQuery);
        let tid: ThreadId = serde_json::from_str("\"7\"").unwrap();
        assert_eq!(tid, ThreadId::from("7"));
    }

    #[test]
    fn test_reset_and_totals() {
        let mut model = TraceModel::new();
        let read = Operation::new(
            ThreadId::from("0"),
            "x",
            0,
            SourceLoc::new("a.c", 3),
            OpKind::Read,
        );
        model.push_op(read.clone());
        model.push_op(Operation::new(
            ThreadId::from("1"),
            "",
            0,
            SourceLoc::new("a.c", 9),
            OpKind::ThreadExit,
        ));
        assert_eq!(model.total_ops(), 2);
        assert_eq!(model.find(&read.order_name()), Some(&read));

        model.reset();
        assert_eq!(model.total_ops(), 0);
        assert!(model.thread_ops(&ThreadId::from("0")).is_empty());
    }
}
