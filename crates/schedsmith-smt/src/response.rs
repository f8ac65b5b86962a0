//! Solver output decoding
//!
//! The solver answers each query with a status line, a model (or an error
//! when none is available), an unsat core (or an error), and finally the
//! echoed end marker. [`ResponseParser`] consumes that stream line by line.

use crate::smtlib::END_MARKER;
use schedsmith_trace::{Schedule, ThreadId, TraceResult};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Satisfiability verdict of one query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SatStatus {
    Sat,
    Unsat,
    #[default]
    Unknown,
}

/// Labels that identify the unsat-core line
const CORE_MARKERS: [&str; 6] = ["PC", "RWC", "LC", "JEC", "Aviso", "solution"];

/// Decoded `PC<n>_T<tid>[_BUGCOND]` label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConditionLabel {
    /// Position among the thread's path conditions
    pub index: usize,
    pub thread: ThreadId,
    pub bug_condition: bool,
}

impl PathConditionLabel {
    pub fn parse(label: &str) -> Option<Self> {
        let rest = label.strip_prefix("PC")?;
        let (index, thread) = rest.split_once("_T")?;
        let index = index.parse().ok()?;
        let (thread, bug_condition) = match thread.strip_suffix("_BUGCOND") {
            Some(thread) => (thread, true),
            None => (thread, false),
        };
        if thread.is_empty() {
            return None;
        }
        Some(Self {
            index,
            thread: ThreadId::from(thread),
            bug_condition,
        })
    }
}

/// Named assertions the solver found jointly unsatisfiable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsatCore {
    raw: String,
    labels: Vec<String>,
}

impl UnsatCore {
    pub fn parse(line: &str) -> Self {
        let labels = line
            .split(|c: char| c == '(' || c == ')' || c.is_whitespace())
            .map(|label| label.trim_matches('|'))
            .filter(|label| !label.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            raw: line.trim().to_string(),
            labels,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn path_conditions(&self) -> Vec<PathConditionLabel> {
        self.labels
            .iter()
            .filter_map(|label| PathConditionLabel::parse(label))
            .collect()
    }

    /// Indices `i` of the `solution<i>` pinning constraints, in core order
    pub fn solution_indices(&self) -> Vec<usize> {
        self.labels
            .iter()
            .filter_map(|label| label.strip_prefix("solution")?.parse().ok())
            .collect()
    }
}

/// Everything read back for one query
#[derive(Debug, Clone, Default)]
pub struct SolverResponse {
    pub status: SatStatus,
    /// Model value -> order variable name
    pub order: BTreeMap<usize, String>,
    /// Values of read and initial-value constants
    pub values: BTreeMap<String, String>,
    pub unsat_core: Option<UnsatCore>,
    /// `(error ...)` lines; the solver reports one for whichever of
    /// model/core is unavailable
    pub errors: Vec<String>,
}

impl SolverResponse {
    pub fn is_sat(&self) -> bool {
        self.status == SatStatus::Sat
    }

    /// Order variables by model value
    pub fn order_names(&self) -> impl Iterator<Item = &str> {
        self.order.values().map(String::as_str)
    }

    /// The schedule the model describes, gaps dropped
    pub fn schedule(&self) -> TraceResult<Schedule> {
        Schedule::parse_names(self.order_names())
    }
}

enum Pending {
    Order(String),
    Value(String),
}

/// Incremental decoder for one response
#[derive(Default)]
pub struct ResponseParser {
    response: SolverResponse,
    pending: Option<Pending>,
    finished: bool,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one output line; returns true once the end marker is seen
    pub fn feed(&mut self, line: &str) -> bool {
        let line = line.trim();
        if self.finished {
            return true;
        }
        if line == END_MARKER {
            self.finished = true;
            return true;
        }

        if let Some(pending) = self.pending.take() {
            if let Some(value) = model_value(line) {
                self.record(pending, value);
                return false;
            }
            warn!(line, "Expected a model value");
        }

        match line {
            "sat" => {
                info!("Model satisfiability: sat");
                self.response.status = SatStatus::Sat;
            }
            "unsat" => {
                info!("Model satisfiability: unsat");
                self.response.status = SatStatus::Unsat;
            }
            "unknown" => {
                info!("Model satisfiability: unknown");
                self.response.status = SatStatus::Unknown;
            }
            _ if line.contains("(define-fun") => self.define_fun(line),
            _ if line.contains("error") => {
                debug!(line, "Solver error");
                self.response.errors.push(line.to_string());
            }
            _ if line.starts_with('(') && CORE_MARKERS.iter().any(|m| line.contains(m)) => {
                info!(core = line, "Unsat core");
                self.response.unsat_core = Some(UnsatCore::parse(line));
            }
            _ => {}
        }
        false
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn finish(self) -> SolverResponse {
        self.response
    }

    fn define_fun(&mut self, line: &str) {
        let Some(rest) = line.split_once("(define-fun").map(|(_, rest)| rest.trim_start()) else {
            return;
        };
        let Some((name, signature)) = rest.split_once("()") else {
            return;
        };
        let name = name.trim().trim_matches('|').to_string();

        let pending = if name.starts_with('O') || name.contains("branch") {
            Pending::Order(name)
        } else if name.starts_with("R-") || name.starts_with("InitR-") {
            Pending::Value(name)
        } else {
            return;
        };

        // `() Int 3)` on one line, or `() Int` with the value on the next
        let inline = signature.trim().strip_prefix("Int").unwrap_or(signature).trim();
        match model_value(inline) {
            Some(value) if !inline.is_empty() => self.record(pending, value),
            _ => self.pending = Some(pending),
        }
    }

    fn record(&mut self, pending: Pending, value: String) {
        match pending {
            Pending::Order(name) => match value.parse::<usize>() {
                Ok(index) => {
                    self.response.order.insert(index, name);
                }
                Err(_) => warn!(name, value, "Order variable without an index"),
            },
            Pending::Value(name) => {
                self.response.values.insert(name, value);
            }
        }
    }
}

/// Value of a model entry's tail, e.g. `2)` or `(- 3))`
fn model_value(text: &str) -> Option<String> {
    let text = text.trim();
    let text = text.strip_suffix(')').unwrap_or(text).trim();
    if text.is_empty() {
        return None;
    }
    if let Some(negative) = text.strip_prefix("(-").and_then(|t| t.strip_suffix(')')) {
        return Some(format!("-{}", negative.trim()));
    }
    if text.contains(['(', ')']) {
        return None;
    }
    Some(text.to_string())
}

/// Decode a complete response text
pub fn parse_response(text: &str) -> SolverResponse {
    let mut parser = ResponseParser::new();
    for line in text.lines() {
        if parser.feed(line) {
            break;
        }
    }
    parser.finish()
}
