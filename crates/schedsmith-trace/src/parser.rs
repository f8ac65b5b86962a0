//! Recorded trace text → [`TraceModel`]
//!
//! One trace holds the events of one thread for one symbolic path. Lines are
//! either section headers (`<readwrite>`, `<path>`, `<pathjpf>`,
//! `<assertThread_ok|fail>`), located events (`file@line:KIND-...`), written
//! values (`$expr$`), path conditions (`T<tid>:expr`) or branch outcomes
//! (`branch-<tid>`).
//!
//! Lock handling keeps per-(object, thread) stacks: reentrant acquisitions
//! only bump a depth counter, and whatever is still open when the trace ends
//! is closed with a fake release.

use crate::error::{TraceError, TraceResult};
use crate::model::{Dialect, LockPair, Release, TraceModel};
use crate::operation::{OpKind, Operation, SourceLoc, ThreadId};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

lazy_static! {
    static ref EVENT_RE: Regex = Regex::new(
        r"^(?P<file>[^@]*)@(?P<line>-?\d+)[:\-]+(?P<kind>[A-Za-z]+)[\-:]?(?P<body>.*)$"
    )
    .expect("valid event regex");
    static ref DEST_RE: Regex =
        Regex::new(r"^(?P<file>[^@]*)@(?P<line>-?\d+)").expect("valid call target regex");
}

/// Open critical sections of every (object, thread)
#[derive(Debug, Default)]
pub struct LockStacks {
    depth: HashMap<(String, ThreadId), u32>,
    next_instance: HashMap<(String, ThreadId), u32>,
    open: HashMap<(String, ThreadId), Vec<LockPair>>,
    /// Outermost held objects per thread, innermost last
    held: HashMap<ThreadId, Vec<String>>,
}

impl LockStacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an acquisition; returns the instance when it opens a new outermost pair
    pub fn acquire(&mut self, object: &str, thread: &ThreadId, loc: &SourceLoc) -> Option<u32> {
        let key = (object.to_string(), thread.clone());
        let depth = self.depth.entry(key.clone()).or_default();
        *depth += 1;
        if *depth > 1 {
            return None;
        }
        let instance = self.open_pair(key, loc);
        self.held
            .entry(thread.clone())
            .or_default()
            .push(object.to_string());
        Some(instance)
    }

    pub fn is_held(&self, object: &str, thread: &ThreadId) -> bool {
        self.depth
            .get(&(object.to_string(), thread.clone()))
            .is_some_and(|depth| *depth > 0)
    }

    /// Record a release; returns the completed pair when the outermost level is left
    pub fn release(
        &mut self,
        object: &str,
        thread: &ThreadId,
        loc: &SourceLoc,
    ) -> Option<LockPair> {
        let key = (object.to_string(), thread.clone());
        let depth = self.depth.get_mut(&key)?;
        *depth = depth.saturating_sub(1);
        if *depth > 0 {
            return None;
        }
        if let Some(held) = self.held.get_mut(thread) {
            if let Some(pos) = held.iter().rposition(|held| held == object) {
                held.remove(pos);
            }
        }
        let mut pair = self.open.get_mut(&key)?.pop()?;
        pair.release = Some(Release {
            loc: loc.clone(),
            fake: false,
        });
        Some(pair)
    }

    /// Innermost lock object the thread currently holds
    pub fn innermost_held(&self, thread: &ThreadId) -> Option<&str> {
        self.held
            .get(thread)
            .and_then(|held| held.last())
            .map(String::as_str)
    }

    /// Close the open pair of `object` at `loc` and immediately open a new one
    /// there, as a condition wait does. Returns the closed pair and the new instance.
    pub fn cycle(
        &mut self,
        object: &str,
        thread: &ThreadId,
        loc: &SourceLoc,
    ) -> Option<(LockPair, u32)> {
        let key = (object.to_string(), thread.clone());
        let mut closed = self.open.get_mut(&key)?.pop()?;
        closed.release = Some(Release {
            loc: loc.clone(),
            fake: false,
        });
        let instance = self.open_pair(key, loc);
        Some((closed, instance))
    }

    /// Remove every pair the thread still has open, innermost first
    pub fn drain_open(&mut self, thread: &ThreadId) -> Vec<LockPair> {
        let held = self.held.remove(thread).unwrap_or_default();
        let mut pairs = Vec::with_capacity(held.len());
        for object in held.into_iter().rev() {
            let key = (object, thread.clone());
            self.depth.remove(&key);
            if let Some(open) = self.open.get_mut(&key) {
                while let Some(pair) = open.pop() {
                    pairs.push(pair);
                }
            }
        }
        pairs
    }

    fn open_pair(&mut self, key: (String, ThreadId), loc: &SourceLoc) -> u32 {
        let counter = self.next_instance.entry(key.clone()).or_default();
        let instance = *counter;
        *counter += 1;
        let pair = LockPair {
            thread: key.1.clone(),
            object: key.0.clone(),
            instance,
            lock_loc: loc.clone(),
            release: None,
        };
        self.open.entry(key).or_default().push(pair);
        instance
    }
}

/// Write header waiting for its `$value$` line
#[derive(Debug)]
struct PendingWrite {
    var: String,
    thread: ThreadId,
    instance: Option<u32>,
    loc: SourceLoc,
}

/// Parse the trace file of `thread` and add its operations to `model`
pub fn parse_trace_file(model: &mut TraceModel, thread: &ThreadId, path: &Path) -> TraceResult<()> {
    let text = std::fs::read_to_string(path)?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    parse_trace(model, thread, &name, &text)
}

/// Parse one trace of `thread` and add its operations to `model`
///
/// `trace_name` only appears in error messages.
pub fn parse_trace(
    model: &mut TraceModel,
    thread: &ThreadId,
    trace_name: &str,
    text: &str,
) -> TraceResult<()> {
    debug!(trace = trace_name, thread = %thread, "parsing trace");
    let mut parser = TraceParser {
        model,
        thread: thread.clone(),
        trace: trace_name.to_string(),
        locks: LockStacks::new(),
        counters: HashMap::new(),
        branch_seq: 0,
        call_seq: 0,
        pending_write: None,
        last_loc: SourceLoc::new(trace_name, 0),
    };
    parser.run(text)?;
    parser.finish();
    Ok(())
}

struct TraceParser<'m> {
    model: &'m mut TraceModel,
    thread: ThreadId,
    trace: String,
    locks: LockStacks,
    counters: HashMap<String, u32>,
    branch_seq: u32,
    call_seq: u32,
    pending_write: Option<PendingWrite>,
    last_loc: SourceLoc,
}

impl TraceParser<'_> {
    fn run(&mut self, text: &str) -> TraceResult<()> {
        let mut lines = text.lines().enumerate().map(|(idx, line)| (idx + 1, line));
        while let Some((lineno, raw)) = lines.next() {
            let line = raw.trim_end_matches('\r');
            let Some(first) = line.chars().next() else {
                continue;
            };
            let located = line.contains('@');
            match first {
                '<' => self.header(line.trim_matches(|c| c == '<' || c == '>')),
                '$' => {
                    let value = if (line.len() > 1 && line.ends_with('$')) || line == "$" {
                        line.trim_matches('$').to_string()
                    } else {
                        let mut value = line[1..].to_string();
                        loop {
                            let Some((_, next)) = lines.next() else {
                                return Err(self.malformed(lineno, line));
                            };
                            let next = next.trim_end_matches('\r');
                            if next.ends_with('$') {
                                value.push_str(&next.replacen('$', "", 1));
                                break;
                            }
                            value.push_str(next);
                        }
                        value
                    };
                    self.complete_write(lineno, line, value)?;
                }
                'T' if !located => {
                    let (tid, first_part) = line[1..]
                        .split_once(':')
                        .ok_or_else(|| self.malformed(lineno, line))?;
                    let mut expr = first_part.to_string();
                    while !is_balanced(&expr) {
                        let Some((_, next)) = lines.next() else {
                            return Err(self.malformed(lineno, line));
                        };
                        expr.push_str(next.trim_end_matches('\r'));
                    }
                    self.path_condition(ThreadId::from(tid), collapse_spaces(&expr));
                }
                'b' if !located => {
                    let tid = line
                        .split_once('-')
                        .map(|(_, tid)| tid)
                        .ok_or_else(|| self.malformed(lineno, line))?;
                    let op = Operation::new(
                        ThreadId::from(tid),
                        "",
                        self.branch_seq,
                        SourceLoc::default(),
                        OpKind::Branch,
                    );
                    self.branch_seq += 1;
                    self.model.push_op(op);
                }
                // path ids are read by the catalog; clock lines are not modelled
                'p' | 'c' if !located => {}
                _ => {
                    let dest = if line.contains(":CS-") || line.contains("-CS-") {
                        lines.next().map(|(_, dest)| dest.trim_end_matches('\r'))
                    } else {
                        None
                    };
                    self.event(lineno, line, dest)?;
                }
            }
        }
        Ok(())
    }

    fn header(&mut self, tag: &str) {
        match tag {
            "readwrite" | "path" => {}
            "pathjpf" => self.model.dialect = Dialect::Jpf,
            "assertThread_ok" | "assertThread_fail" => {
                self.model.assert_thread = Some(self.thread.clone());
                self.model.failed_execution = tag == "assertThread_fail";
                debug!(thread = %self.thread, failed = self.model.failed_execution, "assertion thread");
            }
            other => debug!(header = other, "ignoring unknown section header"),
        }
    }

    fn event(&mut self, lineno: usize, line: &str, dest: Option<&str>) -> TraceResult<()> {
        let caps = EVENT_RE
            .captures(line)
            .ok_or_else(|| self.malformed(lineno, line))?;
        let loc = SourceLoc::new(
            &caps["file"],
            caps["line"]
                .parse::<i64>()
                .map_err(|_| self.malformed(lineno, line))?,
        );
        let body = caps.name("body").map_or("", |m| m.as_str());
        self.last_loc = loc.clone();

        match &caps["kind"] {
            "R" => {
                let (var, tid, id) = split_access(body);
                let (Some(tid), Some(id)) = (tid, id.and_then(|id| id.parse().ok())) else {
                    return Err(self.malformed(lineno, line));
                };
                let op = Operation::new(tid, var.clone(), id, loc, OpKind::Read);
                self.model.reads.entry(var).or_default().push(op.clone());
                self.model.push_op(op);
            }
            "W" => {
                let (var, tid, id) = split_access(body);
                let Some(thread) = tid else {
                    return Err(self.malformed(lineno, line));
                };
                let instance = match id {
                    Some(id) => {
                        self.model.dialect = Dialect::Jpf;
                        Some(id.parse().map_err(|_| self.malformed(lineno, line))?)
                    }
                    None => None,
                };
                if let Some(prev) = self.pending_write.take() {
                    warn!(trace = %self.trace, var = %prev.var, "write without value dropped");
                }
                self.pending_write = Some(PendingWrite {
                    var,
                    thread,
                    instance,
                    loc,
                });
            }
            "CS" => {
                let thread = ThreadId::from(body.split('-').next().unwrap_or_default());
                let dest = dest
                    .and_then(|dest| DEST_RE.captures(dest))
                    .and_then(|caps| {
                        let line = caps["line"].parse().ok()?;
                        Some(SourceLoc::new(&caps["file"], line))
                    })
                    .ok_or_else(|| self.malformed(lineno, line))?;
                self.call_seq += 1;
                self.model.calls.push(Operation::new(
                    thread,
                    "",
                    self.call_seq,
                    loc,
                    OpKind::Call { dest },
                ));
            }
            "S" => self.sync(lineno, line, body, loc)?,
            other => debug!(trace = %self.trace, kind = other, "skipping unknown event"),
        }
        Ok(())
    }

    fn sync(&mut self, lineno: usize, line: &str, body: &str, loc: SourceLoc) -> TraceResult<()> {
        let kind_end = body.find(['-', '_']).unwrap_or(body.len());
        let (kind, rest) = body.split_at(kind_end);
        let rest = rest.get(1..).unwrap_or_default();

        match kind {
            "start" | "exit" => {
                let thread = ThreadId::from(rest);
                let op_kind = if kind == "start" {
                    OpKind::ThreadStart
                } else {
                    OpKind::ThreadExit
                };
                let op = Operation::new(thread.clone(), "", 0, loc, op_kind);
                let slot = if kind == "start" {
                    &mut self.model.starts
                } else {
                    &mut self.model.exits
                };
                slot.insert(thread, op.clone());
                self.model.push_op(op);
            }
            "lock" | "unlock" | "fork" | "join" | "wait" | "timedwait" | "signal"
            | "signalall" | "barrier" => {
                let Some((object, tid)) = rest.rsplit_once('-').filter(|(_, tid)| !tid.is_empty())
                else {
                    if kind == "join" {
                        return Err(TraceError::JoinWithoutChild {
                            trace: self.trace.clone(),
                            line: lineno,
                            text: line.to_string(),
                        });
                    }
                    return Err(self.malformed(lineno, line));
                };
                let thread = ThreadId::from(tid);
                match kind {
                    "lock" => self.lock(object, thread, loc),
                    "unlock" => self.unlock(lineno, object, thread, loc)?,
                    "wait" | "timedwait" => self.wait(object, thread, loc, kind == "timedwait"),
                    "signal" | "signalall" => {
                        let instance = self.next_instance(kind, object, &thread);
                        let op = Operation::new(
                            thread,
                            object,
                            instance,
                            loc,
                            OpKind::Signal {
                                all: kind == "signalall",
                            },
                        );
                        self.model
                            .signals
                            .entry(object.to_string())
                            .or_default()
                            .push(op.clone());
                        self.model.push_op(op);
                    }
                    "barrier" => {
                        let instance = self.next_instance(kind, object, &thread);
                        let op = Operation::new(thread, object, instance, loc, OpKind::Barrier);
                        self.model
                            .barriers
                            .entry(object.to_string())
                            .or_default()
                            .push(op.clone());
                        self.model.push_op(op);
                    }
                    _ => {
                        let child = ThreadId::from(object);
                        let (op_kind, set) = if kind == "fork" {
                            (OpKind::Fork { child }, &mut self.model.forks)
                        } else {
                            (OpKind::Join { child }, &mut self.model.joins)
                        };
                        let op = Operation::new(thread.clone(), object, 0, loc, op_kind);
                        set.entry(thread).or_default().push(op.clone());
                        self.model.push_op(op);
                    }
                }
            }
            other => {
                let tid = rest
                    .split(['-', '_'])
                    .find(|part| !part.is_empty())
                    .ok_or_else(|| self.malformed(lineno, line))?;
                let op = Operation::new(
                    ThreadId::from(tid),
                    "",
                    0,
                    loc,
                    OpKind::Sync {
                        kind: other.to_string(),
                    },
                );
                self.model.other_syncs.push(op.clone());
                self.model.push_op(op);
            }
        }
        Ok(())
    }

    fn lock(&mut self, object: &str, thread: ThreadId, loc: SourceLoc) {
        match self.locks.acquire(object, &thread, &loc) {
            Some(instance) => {
                self.model
                    .push_op(Operation::new(thread, object, instance, loc, OpKind::LockAcquire));
            }
            None => debug!(object, thread = %thread, "reentrant acquisition"),
        }
    }

    fn unlock(
        &mut self,
        lineno: usize,
        object: &str,
        thread: ThreadId,
        loc: SourceLoc,
    ) -> TraceResult<()> {
        if !self.locks.is_held(object, &thread) {
            return Err(TraceError::UnmatchedUnlock {
                trace: self.trace.clone(),
                line: lineno,
                object: object.to_string(),
                thread,
            });
        }
        if let Some(pair) = self.locks.release(object, &thread, &loc) {
            self.close_pair(pair);
        }
        Ok(())
    }

    /// A wait gives up the innermost held lock and takes it again when woken
    fn wait(&mut self, object: &str, thread: ThreadId, loc: SourceLoc, timed: bool) {
        let instance = self.next_instance(if timed { "timedwait" } else { "wait" }, object, &thread);
        let wait = Operation::new(
            thread.clone(),
            object,
            instance,
            loc.clone(),
            OpKind::Wait { timed },
        );
        self.model
            .waits
            .entry(object.to_string())
            .or_default()
            .push(wait.clone());

        let held = self.locks.innermost_held(&thread).map(str::to_string);
        let cycled = held.and_then(|lock| {
            self.locks
                .cycle(&lock, &thread, &loc)
                .map(|(closed, instance)| (lock, closed, instance))
        });
        match cycled {
            Some((lock, closed, reacquired)) => {
                self.close_pair(closed);
                self.model.push_op(wait);
                self.model.push_op(Operation::new(
                    thread,
                    lock,
                    reacquired,
                    loc,
                    OpKind::LockAcquire,
                ));
            }
            None => self.model.push_op(wait),
        }
    }

    fn complete_write(&mut self, lineno: usize, line: &str, value: String) -> TraceResult<()> {
        let pending = self
            .pending_write
            .take()
            .ok_or_else(|| self.malformed(lineno, line))?;
        let value = if value.is_empty() { "0".to_string() } else { value };
        let instance = match pending.instance {
            Some(id) => id,
            None => {
                let site = format!("{}|{}", pending.var, pending.loc);
                self.next_instance("W", &site, &pending.thread)
            }
        };
        let op = Operation::new(
            pending.thread,
            pending.var.clone(),
            instance,
            pending.loc,
            OpKind::Write { value },
        );
        self.model
            .writes
            .entry(pending.var)
            .or_default()
            .push(op.clone());
        self.model.push_op(op);
        Ok(())
    }

    fn path_condition(&mut self, thread: ThreadId, expr: String) {
        let index = self
            .model
            .path_conditions
            .iter()
            .filter(|pc| pc.thread == thread)
            .count() as u32;
        self.model.path_conditions.push(Operation::new(
            thread,
            "",
            index,
            SourceLoc::new(&self.trace, 0),
            OpKind::PathCondition { expr },
        ));
    }

    fn close_pair(&mut self, pair: LockPair) {
        if let Some(release) = pair.release_op() {
            self.model.push_op(release);
        }
        self.model
            .lock_pairs
            .entry(pair.object.clone())
            .or_default()
            .push(pair);
    }

    /// Close open critical sections and append the terminal event
    fn finish(mut self) {
        if let Some(pending) = self.pending_write.take() {
            warn!(trace = %self.trace, var = %pending.var, "trace ends inside a write; dropped");
        }
        let thread = self.thread.clone();
        let mut loc = self.last_loc.clone();
        for mut pair in self.locks.drain_open(&thread) {
            loc = loc.offset(1);
            debug!(object = %pair.object, thread = %thread, "closing critical section with a fake release");
            pair.release = Some(Release {
                loc: loc.clone(),
                fake: true,
            });
            self.close_pair(pair);
        }

        let is_assert_thread = self.model.assert_thread.as_ref() == Some(&thread);
        let kind = if is_assert_thread {
            OpKind::Assert
        } else {
            OpKind::ThreadExit
        };
        let terminal = Operation::new(thread.clone(), "", 0, loc.offset(1), kind);
        self.model.exits.insert(thread.clone(), terminal.clone());
        self.model.push_op(terminal);

        // the last branch of the assertion thread is the assertion itself
        if is_assert_thread {
            if let Some(ops) = self.model.ops_by_thread.get_mut(&thread) {
                if let Some(pos) = ops.iter().rposition(|op| op.kind == OpKind::Branch) {
                    ops.remove(pos);
                }
            }
        }
    }

    fn next_instance(&mut self, tag: &str, object: &str, thread: &ThreadId) -> u32 {
        let counter = self
            .counters
            .entry(format!("{tag}|{object}|{thread}"))
            .or_default();
        let instance = *counter;
        *counter += 1;
        instance
    }

    fn malformed(&self, line: usize, text: &str) -> TraceError {
        TraceError::MalformedLine {
            trace: self.trace.clone(),
            line,
            text: text.to_string(),
        }
    }
}

/// `var[-'>'seg...]-tid[-id]`; segments starting with `>` belong to the variable
fn split_access(body: &str) -> (String, Option<ThreadId>, Option<&str>) {
    let mut parts = body.split('-');
    let mut var = parts.next().unwrap_or_default().to_string();
    let mut tid = None;
    for part in parts.by_ref() {
        if part.starts_with('>') {
            var.push('-');
            var.push_str(part);
        } else {
            tid = Some(ThreadId::from(part));
            break;
        }
    }
    let id = parts.next().filter(|id| !id.is_empty());
    (var, tid, id)
}

fn is_balanced(expr: &str) -> bool {
    let open = expr.matches('(').count();
    let close = expr.matches(')').count();
    open == close
}

fn collapse_spaces(expr: &str) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut prev_space = false;
    for c in expr.chars() {
        if c == ' ' {
            if !prev_space {
                out.push(c);
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::NameKind;

    fn parse(thread: &str, text: &str) -> TraceModel {
        let mut model = TraceModel::new();
        parse_trace(&mut model, &ThreadId::from(thread), "T_test", text).unwrap();
        model
    }

    fn names(model: &TraceModel, thread: &str) -> Vec<String> {
        model
            .thread_ops(&ThreadId::from(thread))
            .iter()
            .map(|op| op.order_name().to_string())
            .collect()
    }

    #[test]
    fn test_reads_writes_and_values() {
        let model = parse(
            "1",
            "<readwrite>\n\
             a.c@3:W-x-1\n\
             $5$\n\
             a.c@4:R-x-1-0\n\
             a.c@5:W-x-1\n\
             $(Add w32 1\n\
             (ReadLSB w32 0 x))$\n",
        );
        assert_eq!(
            names(&model, "1"),
            [
                "OW-x-1-0&a.c@3",
                "OR-x-1-0&a.c@4",
                "OW-x-1-0&a.c@5",
                "OS-exit-1&a.c@6",
            ]
        );
        let writes = &model.writes["x"];
        assert_eq!(
            writes[1].kind,
            OpKind::Write {
                value: "(Add w32 1(ReadLSB w32 0 x))".to_string()
            }
        );
        assert_eq!(model.reads["x"].len(), 1);
        assert_eq!(model.dialect, Dialect::KQuery);
    }

    #[test]
    fn test_arrow_variables_and_jpf_ids() {
        let model = parse("2", "a.c@7:W-obj->f-2-4\n$$\na.c@8:R-obj->f-2-1\n");
        let write = &model.writes["obj->f"][0];
        assert_eq!(write.instance, 4);
        assert_eq!(write.kind, OpKind::Write { value: "0".to_string() });
        assert_eq!(model.reads["obj->f"][0].thread.as_str(), "2");
        assert_eq!(model.dialect, Dialect::Jpf);
    }

    #[test]
    fn test_reentrant_lock_records_outermost_pair() {
        let model = parse(
            "1",
            "a.c@1:S-lock_m-1\n\
             a.c@2:S-lock_m-1\n\
             a.c@3:R-x-1-0\n\
             a.c@4:S-unlock_m-1\n\
             a.c@5:S-unlock_m-1\n",
        );
        let pairs = &model.lock_pairs["m"];
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].lock_loc.line, 1);
        assert_eq!(pairs[0].release.as_ref().unwrap().loc.line, 5);
        assert_eq!(
            names(&model, "1"),
            [
                "OS-lock_m-1-0&a.c@1",
                "OR-x-1-0&a.c@3",
                "OS-unlock_m-1-0&a.c@5",
                "OS-exit-1&a.c@6",
            ]
        );
    }

    #[test]
    fn test_open_lock_gets_fake_release() {
        let model = parse("1", "a.c@1:S-lock_m-1\na.c@2:S-lock_n-1\na.c@3:R-x-1-0\n");
        let ops = names(&model, "1");
        assert_eq!(ops[3], "OS-unlockFake_n-1-0&a.c@4");
        assert_eq!(ops[4], "OS-unlockFake_m-1-0&a.c@5");
        assert_eq!(ops[5], "OS-exit-1&a.c@6");
        assert!(model.lock_pairs["m"][0].release.as_ref().unwrap().fake);
    }

    #[test]
    fn test_unlock_without_lock_is_rejected() {
        let mut model = TraceModel::new();
        let err = parse_trace(&mut model, &ThreadId::from("1"), "T1", "a.c@1:S-unlock_m-1\n")
            .unwrap_err();
        assert!(matches!(err, TraceError::UnmatchedUnlock { line: 1, .. }));
    }

    #[test]
    fn test_join_without_child_is_fatal() {
        let mut model = TraceModel::new();
        let err =
            parse_trace(&mut model, &ThreadId::from("0"), "T0", "a.c@9:S-join_2\n").unwrap_err();
        assert!(matches!(err, TraceError::JoinWithoutChild { .. }));
    }

    #[test]
    fn test_wait_cycles_innermost_held_lock() {
        let model = parse(
            "1",
            "a.c@1:S-lock_m-1\n\
             a.c@2:S-lock_n-1\n\
             a.c@3:S-unlock_n-1\n\
             a.c@4:S-wait_cv-1\n\
             a.c@5:S-unlock_m-1\n",
        );
        assert_eq!(
            names(&model, "1"),
            [
                "OS-lock_m-1-0&a.c@1",
                "OS-lock_n-1-0&a.c@2",
                "OS-unlock_n-1-0&a.c@3",
                "OS-unlock_m-1-0&a.c@4",
                "OS-wait_cv-1-0&a.c@4",
                "OS-lock_m-1-1&a.c@4",
                "OS-unlock_m-1-1&a.c@5",
                "OS-exit-1&a.c@6",
            ]
        );
        assert_eq!(model.lock_pairs["m"].len(), 2);
        assert_eq!(model.waits["cv"].len(), 1);
    }

    #[test]
    fn test_wait_without_lock() {
        let model = parse("1", "a.c@4:S-timedwait_cv-1\n");
        assert_eq!(names(&model, "1")[0], "OS-timedwait_cv-1-0&a.c@4");
        assert!(model.lock_pairs.is_empty());
    }

    #[test]
    fn test_thread_lifecycle_events() {
        let model = parse(
            "0",
            "a.c@1:S-start-0\n\
             a.c@2:S-fork_1-0\n\
             a.c@3:S-join_1-0\n\
             a.c@4:S-signalall_cv-0\n\
             a.c@5:S-barrier_b-0\n\
             a.c@6:S-yield-0\n",
        );
        let t0 = ThreadId::from("0");
        assert!(model.starts.contains_key(&t0));
        assert_eq!(
            model.forks[&t0][0].kind,
            OpKind::Fork {
                child: ThreadId::from("1")
            }
        );
        assert_eq!(model.joins[&t0][0].var, "1");
        assert_eq!(model.signals["cv"][0].kind, OpKind::Signal { all: true });
        assert_eq!(model.barriers["b"].len(), 1);
        assert_eq!(
            model.other_syncs[0].order_name().kind(),
            &NameKind::Sync("yield".to_string())
        );
        assert_eq!(model.exits[&t0].loc.line, 7);
    }

    #[test]
    fn test_path_conditions_and_assert_thread() {
        let model = parse(
            "1",
            "<assertThread_fail>\n\
             <path>\n\
             branch-1\n\
             a.c@3:R-x-1-0\n\
             branch-1\n\
             T1:(Eq 0\n\
             \x20   (ReadLSB w32 0  x-1-0))\n\
             T1:(Ult 1 2)\n\
             pathid-110\n",
        );
        let t1 = ThreadId::from("1");
        assert_eq!(model.assert_thread.as_ref(), Some(&t1));
        assert!(model.failed_execution);
        assert_eq!(model.path_conditions.len(), 2);
        assert_eq!(
            model.path_conditions[0].kind,
            OpKind::PathCondition {
                expr: "(Eq 0 (ReadLSB w32 0 x-1-0))".to_string()
            }
        );
        assert_eq!(model.path_conditions[1].instance, 1);
        // the second branch is the assertion
        assert_eq!(
            names(&model, "1"),
            ["branch-1-0", "OR-x-1-0&a.c@3", "OS-Assert-1&a.c@4"]
        );
        assert!(matches!(model.exits[&t1].kind, OpKind::Assert));
    }

    #[test]
    fn test_calls_stay_out_of_program_order() {
        let model = parse("1", "a.c@3:CS-1\nb.c@40:entry\na.c@4:R-x-1-0\n");
        assert_eq!(model.calls.len(), 1);
        assert_eq!(
            model.calls[0].order_name().as_str(),
            "OC-FunCall-1-1&a.c/b.c@3/40"
        );
        assert_eq!(names(&model, "1").len(), 2);
    }

    #[test]
    fn test_malformed_read() {
        let mut model = TraceModel::new();
        let err =
            parse_trace(&mut model, &ThreadId::from("1"), "T1", "a.c@3:R-x\n").unwrap_err();
        assert!(matches!(err, TraceError::MalformedLine { line: 1, .. }));
    }

    #[test]
    fn test_lock_stacks_cycle_and_drain() {
        let mut stacks = LockStacks::new();
        let t = ThreadId::from("1");
        let loc = SourceLoc::new("a.c", 1);
        assert_eq!(stacks.acquire("m", &t, &loc), Some(0));
        assert_eq!(stacks.acquire("m", &t, &loc), None);
        assert_eq!(stacks.innermost_held(&t), Some("m"));
        let (closed, next) = stacks.cycle("m", &t, &loc).unwrap();
        assert_eq!(closed.instance, 0);
        assert_eq!(next, 1);
        let open = stacks.drain_open(&t);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].instance, 1);
        assert!(!stacks.is_held("m", &t));
    }
}
