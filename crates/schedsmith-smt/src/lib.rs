//! Constraint generation and solver protocol for schedsmith
//!
//! Turns a [`TraceModel`](schedsmith_trace::TraceModel) into a labeled SMT-LIB
//! formula whose models are schedules, and drives an interactive solver
//! process to check it.
//!
//! # Components
//!
//! - **Constraint Model Generator**: memory-order, read-write, path, locking,
//!   fork/join, wait/signal and barrier constraints, with statistics
//! - **Formula**: line buffer staged to disk before it is replayed
//! - **Solver session**: subprocess lifecycle, bounded response reads,
//!   pinned-order queries with optional bug-condition inversion
//! - **Response parser**: status, model, values and unsat core
//!
//! # Example
//!
//! ```ignore
//! use schedsmith_smt::{build_constraint_model, SolverConfig, SolverSession};
//!
//! let model = build_constraint_model(&trace_model, !trace_model.failed_execution);
//! let mut session = SolverSession::start(SolverConfig::default())?;
//! session.stage(&model.formula)?;
//! let response = session.solve()?;
//! if response.is_sat() {
//!     println!("{}", response.schedule()?.pretty());
//! }
//! ```

pub mod config;
pub mod constraints;
pub mod error;
pub mod formula;
pub mod response;
pub mod session;
pub mod smtlib;

pub use config::SolverConfig;
pub use constraints::{
    build_constraint_model, ConstraintModel, ConstraintModelGenerator, ConstraintStats,
};
pub use error::{SmtError, SmtResult};
pub use formula::Formula;
pub use response::{
    parse_response, PathConditionLabel, ResponseParser, SatStatus, SolverResponse, UnsatCore,
};
pub use session::{PinnedResponse, SolverSession};
