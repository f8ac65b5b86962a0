//! Recorded events and their solver-facing names
//!
//! Every [`Operation`] exposes two identifiers: a *value name* for the symbolic
//! value it contributes (a read's result, a write's value) and an *order name*
//! for the integer variable holding its position in the global order.
//!
//! Order names travel through the engine as typed [`OrderName`] values. The
//! textual wire form is produced when a formula is written and decoded again
//! when a solver model or a solution file is read back.

use crate::error::{TraceError, TraceResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a recorded thread
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ThreadId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Source position of a recorded event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SourceLoc {
    pub file: String,
    pub line: i64,
}

impl SourceLoc {
    pub fn new(file: impl Into<String>, line: i64) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// Same file, `delta` lines further down
    pub fn offset(&self, delta: i64) -> Self {
        Self {
            file: self.file.clone(),
            line: self.line + delta,
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.file, self.line)
    }
}

/// What a recorded event does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    Read,
    Write {
        /// Written value in the recording dialect's expression syntax
        value: String,
    },
    LockAcquire,
    LockRelease {
        /// Release synthesized because the trace ended inside the critical section
        fake: bool,
    },
    Fork {
        child: ThreadId,
    },
    Join {
        child: ThreadId,
    },
    ThreadStart,
    ThreadExit,
    /// Terminal event of the thread that evaluates the assertion
    Assert,
    Wait {
        timed: bool,
    },
    Signal {
        all: bool,
    },
    Barrier,
    Branch,
    /// Function call from `loc` into `dest`; not part of the memory order
    Call {
        dest: SourceLoc,
    },
    /// Branch condition recorded by the symbolic execution
    PathCondition {
        expr: String,
    },
    /// Any other synchronisation event, kept opaque
    Sync {
        kind: String,
    },
}

impl OpKind {
    /// Tag used for synchronisation events in `S-`/`OS-` names
    pub fn sync_tag(&self) -> Option<&str> {
        let tag = match self {
            OpKind::LockAcquire => "lock",
            OpKind::LockRelease { fake: false } => "unlock",
            OpKind::LockRelease { fake: true } => "unlockFake",
            OpKind::Fork { .. } => "fork",
            OpKind::Join { .. } => "join",
            OpKind::ThreadStart => "start",
            OpKind::ThreadExit => "exit",
            OpKind::Assert => "Assert",
            OpKind::Wait { timed: false } => "wait",
            OpKind::Wait { timed: true } => "timedwait",
            OpKind::Signal { all: false } => "signal",
            OpKind::Signal { all: true } => "signalall",
            OpKind::Barrier => "barrier",
            OpKind::Sync { kind } => kind.as_str(),
            OpKind::Read
            | OpKind::Write { .. }
            | OpKind::Branch
            | OpKind::Call { .. }
            | OpKind::PathCondition { .. } => return None,
        };
        Some(tag)
    }
}

/// One recorded event of one thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub thread: ThreadId,
    /// Variable, lock object or condition object; the child thread for fork/join
    pub var: String,
    /// Disambiguates repeated events with the same kind, variable and thread
    pub instance: u32,
    pub loc: SourceLoc,
    pub kind: OpKind,
}

impl Operation {
    pub fn new(
        thread: ThreadId,
        var: impl Into<String>,
        instance: u32,
        loc: SourceLoc,
        kind: OpKind,
    ) -> Self {
        Self {
            thread,
            var: var.into(),
            instance,
            loc,
            kind,
        }
    }

    /// Name of the integer variable holding this event's global position
    pub fn order_name(&self) -> OrderName {
        let text = self.render("O");
        let kind = match &self.kind {
            OpKind::Read => NameKind::Read,
            OpKind::Write { .. } => NameKind::Write,
            OpKind::LockAcquire => NameKind::Lock,
            OpKind::LockRelease { fake } => NameKind::Unlock { fake: *fake },
            OpKind::Branch => NameKind::Branch {
                seq: self.instance as usize,
            },
            OpKind::Call { .. } => NameKind::Call,
            OpKind::PathCondition { .. } => NameKind::PathCondition,
            other => NameKind::Sync(other.sync_tag().unwrap_or_default().to_string()),
        };
        OrderName {
            text,
            kind,
            thread: self.thread.clone(),
            var: self.var.clone(),
        }
    }

    /// Name of the symbolic value this event contributes
    pub fn value_name(&self) -> String {
        self.render("")
    }

    /// Initial-value constant shared by every read of the same variable in a thread
    pub fn initial_value_name(&self) -> Option<String> {
        match self.kind {
            OpKind::Read => Some(format!("InitR-{}-{}", self.var, self.thread)),
            _ => None,
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self.kind, OpKind::Read)
    }

    pub fn is_write(&self) -> bool {
        matches!(self.kind, OpKind::Write { .. })
    }

    fn render(&self, order_prefix: &str) -> String {
        let t = &self.thread;
        let i = self.instance;
        match &self.kind {
            OpKind::Read if order_prefix.is_empty() => format!("R-{}-{t}-{i}", self.var),
            OpKind::Read => format!("{order_prefix}R-{}-{t}-{i}&{}", self.var, self.loc),
            OpKind::Write { .. } => format!("{order_prefix}W-{}-{t}-{i}&{}", self.var, self.loc),
            OpKind::Branch => format!("branch-{t}-{i}"),
            OpKind::PathCondition { .. } => format!("PC{i}_T{t}"),
            OpKind::Call { dest } => {
                let call = if order_prefix.is_empty() { "" } else { "OC-" };
                format!(
                    "{call}FunCall-{t}-{i}&{}/{}@{}/{}",
                    self.loc.file, dest.file, self.loc.line, dest.line
                )
            }
            other => {
                let tag = other.sync_tag().unwrap_or_default();
                if self.var.is_empty() {
                    format!("{order_prefix}S-{tag}-{t}&{}", self.loc)
                } else {
                    format!("{order_prefix}S-{tag}_{}-{t}-{i}&{}", self.var, self.loc)
                }
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.thread, self.value_name())?;
        if let OpKind::Write { value } = &self.kind {
            write!(f, " = ${value}$")?;
        }
        Ok(())
    }
}

/// Decoded category of an order name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NameKind {
    Read,
    Write,
    Lock,
    Unlock { fake: bool },
    Branch { seq: usize },
    Call,
    PathCondition,
    /// Other synchronisation events, by tag (`fork`, `exit`, `wait`, ...)
    Sync(String),
}

/// Typed identity of an order variable, with its wire text
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderName {
    text: String,
    kind: NameKind,
    thread: ThreadId,
    var: String,
}

impl OrderName {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> &NameKind {
        &self.kind
    }

    pub fn thread(&self) -> &ThreadId {
        &self.thread
    }

    /// Variable or object the event touches; empty when it has none
    pub fn var(&self) -> &str {
        &self.var
    }

    pub fn is_read(&self) -> bool {
        self.kind == NameKind::Read
    }

    pub fn is_lock(&self) -> bool {
        self.kind == NameKind::Lock
    }

    pub fn is_unlock(&self) -> bool {
        matches!(self.kind, NameKind::Unlock { .. })
    }

    pub fn branch_seq(&self) -> Option<usize> {
        match self.kind {
            NameKind::Branch { seq } => Some(seq),
            _ => None,
        }
    }

    /// Tag of a synchronisation event that is neither a lock nor an unlock
    pub fn sync_tag(&self) -> Option<&str> {
        match &self.kind {
            NameKind::Sync(tag) => Some(tag),
            _ => None,
        }
    }

    /// Whether this order variable belongs to the value name `token` (`R-x-1-0` for `OR-x-1-0&f@3`)
    pub fn matches_value(&self, token: &str) -> bool {
        match self.text.strip_prefix('O') {
            Some(rest) => {
                rest == token
                    || rest
                        .strip_prefix(token)
                        .is_some_and(|tail| tail.starts_with('&'))
            }
            None => self.text == token,
        }
    }

    pub fn parse(text: &str) -> TraceResult<Self> {
        text.parse()
    }

    fn new(text: &str, kind: NameKind, thread: &str, var: &str) -> Self {
        Self {
            text: text.to_string(),
            kind,
            thread: ThreadId::new(thread),
            var: var.to_string(),
        }
    }
}

impl fmt::Display for OrderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for OrderName {
    type Err = TraceError;

    fn from_str(text: &str) -> TraceResult<Self> {
        let malformed = || TraceError::MalformedName(text.to_string());
        let is_index = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

        if let Some(rest) = text.strip_prefix("branch-") {
            let (tid, seq) = rest.rsplit_once('-').ok_or_else(malformed)?;
            let seq = seq.parse().map_err(|_| malformed())?;
            return Ok(Self::new(text, NameKind::Branch { seq }, tid, ""));
        }

        if let Some(rest) = text.strip_prefix("PC") {
            let (index, tid) = rest.split_once("_T").ok_or_else(malformed)?;
            if !is_index(index) {
                return Err(malformed());
            }
            let tid = tid.split('_').next().unwrap_or_default();
            return Ok(Self::new(text, NameKind::PathCondition, tid, ""));
        }

        let head = text.split_once('&').map_or(text, |(head, _)| head);

        if let Some(rest) = head.strip_prefix("OC-FunCall-") {
            let (tid, _) = rest.rsplit_once('-').ok_or_else(malformed)?;
            return Ok(Self::new(text, NameKind::Call, tid, ""));
        }

        let access = head
            .strip_prefix("OR-")
            .map(|rest| (NameKind::Read, rest))
            .or_else(|| head.strip_prefix("OW-").map(|rest| (NameKind::Write, rest)));
        if let Some((kind, rest)) = access {
            let (body, instance) = rest.rsplit_once('-').ok_or_else(malformed)?;
            let (var, tid) = body.rsplit_once('-').ok_or_else(malformed)?;
            if !is_index(instance) || var.is_empty() {
                return Err(malformed());
            }
            return Ok(Self::new(text, kind, tid, var));
        }

        if let Some(rest) = head.strip_prefix("OS-") {
            let first = rest.split('-').next().unwrap_or_default();
            let (tag, var, tid) = if first.contains('_') {
                let (body, instance) = rest.rsplit_once('-').ok_or_else(malformed)?;
                let (tagged, tid) = body.rsplit_once('-').ok_or_else(malformed)?;
                let (tag, var) = tagged.split_once('_').ok_or_else(malformed)?;
                if !is_index(instance) {
                    return Err(malformed());
                }
                (tag, var, tid)
            } else {
                let (tag, tid) = rest.rsplit_once('-').ok_or_else(malformed)?;
                (tag, "", tid)
            };
            let kind = match tag {
                "lock" => NameKind::Lock,
                "unlock" => NameKind::Unlock { fake: false },
                "unlockFake" => NameKind::Unlock { fake: true },
                other => NameKind::Sync(other.to_string()),
            };
            return Ok(Self::new(text, kind, tid, var));
        }

        Err(malformed())
    }
}
