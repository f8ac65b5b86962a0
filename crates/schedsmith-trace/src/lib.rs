//! Recorded per-thread traces for schedsmith
//!
//! This crate turns the symbolic traces recorded for each thread of a
//! concurrent program into typed operations, and holds the schedule types
//! the rest of the workspace exchanges.
//!
//! # Components
//!
//! - **Operations**: typed events with stable value and order names
//! - **Parser**: trace text → [`TraceModel`], with lock-pair matching
//! - **Translators**: KQuery and JPF expressions → SMT-LIB
//! - **Schedules**: total orders, TEI helpers, solution and values files
//!
//! # Example
//!
//! ```ignore
//! use schedsmith_trace::{parse_trace_file, ThreadId, TraceModel};
//!
//! let mut model = TraceModel::new();
//! parse_trace_file(&mut model, &ThreadId::from("1"), "traces/T1_0_trace".as_ref())?;
//! println!("{} operations", model.total_ops());
//! ```

pub mod error;
pub mod model;
pub mod operation;
pub mod parser;
pub mod schedule;
pub mod translate;

pub use error::{TraceError, TraceResult};
pub use model::{combination_key, Dialect, LockPair, Release, TraceCombination, TraceModel};
pub use operation::{NameKind, OpKind, Operation, OrderName, SourceLoc, ThreadId};
pub use parser::{parse_trace, parse_trace_file, LockStacks};
pub use schedule::{
    alternate_path_for, load_values, save_values, values_path_for, PrettySchedule, Schedule,
    SolutionFile,
};
pub use translate::{translator_for, ExpressionTranslator, JpfTranslator, KQueryTranslator};
