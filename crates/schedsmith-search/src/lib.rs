//! Schedule search for schedsmith
//!
//! Explores combinations of recorded per-thread paths until the solver finds
//! an order of operations that fails the assertion, then looks for the pair
//! of events whose order causes the failure.
//!
//! # Components
//!
//! - **Catalog**: trace files indexed by thread and path id, with a path trie per thread
//! - **Explorer**: unsat-core guided branch flipping with breadth-first picks
//! - **Synthesis**: external symbolic execution for flipped branches without traces
//! - **Simplifier**: context-switch reduction against a feasibility oracle
//! - **Root cause**: event-pair inversion around the unsat core of a failing schedule
//! - **Engine**: the search loops tying the above to a solver session
//!
//! # Example
//!
//! ```ignore
//! use schedsmith_search::{Engine, EngineConfig};
//!
//! let mut engine = Engine::new(EngineConfig::new("traces").with_csr(true))?;
//! if let Some(found) = engine.find_failing_schedule()? {
//!     println!("{}", found.schedule.pretty());
//! }
//! if let Some(cause) = engine.find_root_cause()? {
//!     println!("{:?}", cause.pair.map(|pair| pair.cause()));
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod explorer;
pub mod root_cause;
pub mod simplify;
pub mod synthesis;
pub mod trie;

pub use catalog::{TraceCatalog, TraceRecord, DEFAULT_PATH_ID};
pub use config::{EngineConfig, ExplorerConfig, SynthesisConfig, MAX_DISTANCE};
pub use engine::{BugGoal, Engine, FailingSchedule, RootCause};
pub use error::{SearchError, SearchResult};
pub use explorer::{branch_subsets, ExplorationContext, Explorer, ExplorerStats};
pub use root_cause::{EventPair, Segment};
pub use simplify::{simplify, FeasibilityOracle};
pub use synthesis::{CommandSynthesizer, NoSynthesis, SynthesisOutcome, Synthesizer};
pub use trie::PathTrie;
