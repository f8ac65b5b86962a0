//! Interactive solver subprocess
//!
//! A [`SolverSession`] owns one solver process. Formulas are staged to a file
//! first and then replayed into the solver's stdin line by line; the reply is
//! read until the echoed end marker. A background thread drains the solver's
//! stdout into a channel, so every wait for output is bounded by
//! [`SolverConfig::response_timeout`].

use crate::config::SolverConfig;
use crate::error::{SmtError, SmtResult};
use crate::formula::Formula;
use crate::response::{ResponseParser, SolverResponse};
use crate::smtlib;
use schedsmith_trace::Schedule;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

/// How long a closing solver gets to honour `(exit)` before it is killed
const EXIT_GRACE: Duration = Duration::from_millis(500);

/// Lines appended to every staged formula
const QUERY_FOOTER: [&str; 5] = [
    smtlib::CHECK_SAT,
    smtlib::GET_MODEL,
    smtlib::GET_UNSAT_CORE,
    "(echo \"end\")",
    smtlib::RESET,
];

/// Reply to a query with a pinned operation order
#[derive(Debug, Clone, Default)]
pub struct PinnedResponse {
    pub response: SolverResponse,
    /// Read and write values named in the bug condition, when it was inverted
    pub bug_condition_ops: Vec<String>,
}

struct SolverProcess {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    lines: Receiver<String>,
    reader: Option<JoinHandle<()>>,
}

impl SolverProcess {
    fn spawn(binary: &Path, args: &[String]) -> SmtResult<Self> {
        let mut child = Command::new(binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| SmtError::Spawn {
                binary: binary.to_path_buf(),
                source,
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SmtError::SolverExited);
            }
        };

        let (tx, lines) = mpsc::channel();
        let reader = thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        info!(pid = child.id(), binary = %binary.display(), "Started solver");
        Ok(Self {
            child,
            stdin: BufWriter::new(stdin),
            lines,
            reader: Some(reader),
        })
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn send<I, S>(&mut self, lines: I) -> SmtResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let result = lines
            .into_iter()
            .try_for_each(|line| writeln!(self.stdin, "{}", line.as_ref()))
            .and_then(|()| self.stdin.flush());
        result.map_err(|err| match err.kind() {
            ErrorKind::BrokenPipe => SmtError::SolverExited,
            _ => SmtError::Io(err),
        })
    }

    fn receive(&mut self, timeout: Duration) -> SmtResult<SolverResponse> {
        let deadline = Instant::now() + timeout;
        let mut parser = ResponseParser::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.lines.recv_timeout(remaining) {
                Ok(line) => {
                    if parser.feed(&line) {
                        return Ok(parser.finish());
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Err(SmtError::NoTerminator { timeout }),
                Err(RecvTimeoutError::Disconnected) => return Err(SmtError::SolverExited),
            }
        }
    }

    /// Ask the solver to exit, killing it if it does not
    fn shutdown(mut self) {
        let pid = self.child.id();
        let _ = writeln!(self.stdin, "{}", smtlib::EXIT);
        let _ = self.stdin.flush();
        drop(self.stdin);

        match self.child.wait_timeout(EXIT_GRACE) {
            Ok(Some(status)) => debug!(pid, %status, "Solver exited"),
            _ => {
                debug!(pid, "Killing solver");
                let _ = self.child.kill();
                let _ = self.child.wait();
            }
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

/// One solver process and the formula file it is fed from
pub struct SolverSession {
    config: SolverConfig,
    binary: PathBuf,
    formula_path: PathBuf,
    _scratch: Option<TempDir>,
    process: Option<SolverProcess>,
    staged: bool,
}

impl SolverSession {
    /// Spawn the solver
    pub fn start(config: SolverConfig) -> SmtResult<Self> {
        let binary = config.resolve_binary()?;
        let (formula_path, scratch) = match &config.formula_path {
            Some(path) => (path.clone(), None),
            None => {
                let dir = TempDir::new()?;
                (dir.path().join("model.smt2"), Some(dir))
            }
        };
        let process = SolverProcess::spawn(&binary, &config.args)?;
        Ok(Self {
            config,
            binary,
            formula_path,
            _scratch: scratch,
            process: Some(process),
            staged: false,
        })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// File the staged formula lives in
    pub fn formula_path(&self) -> &Path {
        &self.formula_path
    }

    pub fn is_staged(&self) -> bool {
        self.staged
    }

    /// Write `formula` plus the query footer to the formula file
    pub fn stage(&mut self, formula: &Formula) -> SmtResult<()> {
        let mut staged = formula.clone();
        for line in QUERY_FOOTER {
            staged.push(line);
        }
        staged.write_to(&self.formula_path)?;
        self.staged = true;
        debug!(
            path = %self.formula_path.display(),
            lines = staged.len(),
            "Staged formula"
        );
        Ok(())
    }

    /// Check the staged formula as written
    pub fn solve(&mut self) -> SmtResult<SolverResponse> {
        let lines = self.staged_lines()?;
        self.query(&lines)
    }

    /// Check the staged formula with `pinned` forced as the operation order
    ///
    /// Each consecutive pair is asserted as `solution<i>`, so an unsat core
    /// names the positions that cannot be kept. With `invert_bug_condition`
    /// the bug-condition assertion is negated.
    pub fn solve_with_solution(
        &mut self,
        pinned: &Schedule,
        invert_bug_condition: bool,
    ) -> SmtResult<PinnedResponse> {
        let staged = self.staged_lines()?;
        let mut lines = Vec::with_capacity(staged.len() + pinned.len());
        let mut bug_condition_ops = Vec::new();

        for line in staged {
            if invert_bug_condition && line.contains("BUGCOND") {
                if let Some((expr, label)) = smtlib::split_named_assert(&line) {
                    for token in value_tokens(expr) {
                        if !bug_condition_ops.iter().any(|op| op == token) {
                            bug_condition_ops.push(token.to_string());
                        }
                    }
                    lines.push(smtlib::named_assert(&smtlib::invert(expr), label));
                    continue;
                }
            }
            if line.trim() == smtlib::CHECK_SAT {
                lines.extend(pinned_order_asserts(pinned));
            }
            lines.push(line);
        }

        let response = self.query(&lines)?;
        Ok(PinnedResponse {
            response,
            bug_condition_ops,
        })
    }

    /// Replace the solver process with a fresh one
    pub fn restart(&mut self) -> SmtResult<()> {
        if let Some(process) = self.process.take() {
            process.shutdown();
        }
        warn!("Restarting solver");
        self.process = Some(SolverProcess::spawn(&self.binary, &self.config.args)?);
        Ok(())
    }

    /// Send `(exit)` and reap the solver
    pub fn close(&mut self) {
        if let Some(process) = self.process.take() {
            process.shutdown();
        }
    }

    fn staged_lines(&self) -> SmtResult<Vec<String>> {
        if !self.staged {
            return Err(SmtError::NotStaged);
        }
        let text = fs::read_to_string(&self.formula_path)?;
        Ok(text.lines().map(str::to_string).collect())
    }

    fn ensure_running(&mut self) -> SmtResult<&mut SolverProcess> {
        let alive = self.process.as_mut().is_some_and(SolverProcess::is_alive);
        if !alive {
            self.restart()?;
        }
        self.process.as_mut().ok_or(SmtError::SolverExited)
    }

    fn query(&mut self, lines: &[String]) -> SmtResult<SolverResponse> {
        let timeout = self.config.response_timeout;
        let started = Instant::now();
        let process = self.ensure_running()?;
        let result = process.send(lines).and_then(|()| process.receive(timeout));

        match result {
            Ok(response) => {
                debug!(elapsed = ?started.elapsed(), "Solver answered");
                Ok(response)
            }
            Err(err) => {
                // the process is in an unknown state; the next query starts a new one
                warn!(error = %err, "Solver query failed");
                if let Some(process) = self.process.take() {
                    process.shutdown();
                }
                Err(err)
            }
        }
    }
}

impl Drop for SolverSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn pinned_order_asserts(pinned: &Schedule) -> impl Iterator<Item = String> + '_ {
    pinned
        .as_slice()
        .windows(2)
        .enumerate()
        .map(|(i, pair)| {
            smtlib::named_assert(
                &smtlib::lt(pair[0].as_str(), pair[1].as_str()),
                &format!("solution{i}"),
            )
        })
}

/// `R-`/`W-` value names inside an expression
fn value_tokens(expr: &str) -> impl Iterator<Item = &str> {
    expr.split(|c: char| c == '(' || c == ')' || c.is_whitespace())
        .filter(|token| token.starts_with("R-") || token.starts_with("W-"))
}
