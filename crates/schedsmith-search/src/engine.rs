//! Search loops: failing-schedule synthesis and root-cause search
//!
//! The engine owns the solver session, the trace catalog and the synthesizer.
//! Each attempt loads one trace combination, builds its constraint model,
//! stages it and asks the solver for an order.

use crate::catalog::TraceCatalog;
use crate::config::EngineConfig;
use crate::error::{SearchError, SearchResult};
use crate::explorer::{ExplorationContext, Explorer, ExplorerStats};
use crate::root_cause::{
    bug_positions, core_window, extend_core_to_lock, generate_event_pairs, reads_before,
    try_event_pairs, EventPair,
};
use crate::simplify::simplify;
use crate::synthesis::{CommandSynthesizer, NoSynthesis, SynthesisOutcome, Synthesizer};
use crate::trie::PathTrie;
use schedsmith_smt::{build_constraint_model, ConstraintStats, SolverResponse, SolverSession};
use schedsmith_trace::{
    combination_key, save_values, values_path_for, Schedule, SolutionFile, ThreadId,
    TraceCombination, TraceModel,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Which side of the bug condition a query asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BugGoal {
    /// A schedule in which the assertion fails
    Reproduce,
    /// A schedule in which the assertion holds
    Avoid,
}

impl BugGoal {
    /// Whether the recorded bug condition has to be negated for this goal
    pub fn invert(self, failed_execution: bool) -> bool {
        match self {
            BugGoal::Reproduce => !failed_execution,
            BugGoal::Avoid => failed_execution,
        }
    }
}

/// A schedule that makes the assertion fail
#[derive(Debug, Clone)]
pub struct FailingSchedule {
    pub combination: TraceCombination,
    pub schedule: Schedule,
    pub values: BTreeMap<String, String>,
    pub stats: ExplorerStats,
    /// Found on a recorded production run, without exploration
    pub production_run: bool,
}

/// Outcome of root-cause search
#[derive(Debug, Clone)]
pub struct RootCause {
    /// Inverted pair; None when the alternate schedule came from exploration
    pub pair: Option<EventPair>,
    /// Bug-avoiding schedule
    pub schedule: Schedule,
    pub values: BTreeMap<String, String>,
    pub combination: TraceCombination,
}

/// Drives the solver over the trace space
pub struct Engine {
    config: EngineConfig,
    session: SolverSession,
    catalog: TraceCatalog,
    synthesizer: Box<dyn Synthesizer>,
    model: TraceModel,
}

impl Engine {
    /// Start the solver and index the trace folder
    pub fn new(config: EngineConfig) -> SearchResult<Self> {
        config.validate()?;
        let catalog = TraceCatalog::from_dir(&config.trace_folder)?;
        info!(
            traces = catalog.len(),
            folder = %config.trace_folder.display(),
            "Loaded trace catalog"
        );
        let synthesizer: Box<dyn Synthesizer> = if config.synthesis.command.is_some() {
            Box::new(CommandSynthesizer::new(
                config.synthesis.clone(),
                config.synthesis_output_dir(),
            ))
        } else {
            Box::new(NoSynthesis)
        };
        let session = SolverSession::start(config.solver.clone())?;
        Ok(Self::with_parts(config, session, catalog, synthesizer))
    }

    pub fn with_parts(
        config: EngineConfig,
        session: SolverSession,
        catalog: TraceCatalog,
        synthesizer: Box<dyn Synthesizer>,
    ) -> Self {
        Self {
            config,
            session,
            catalog,
            synthesizer,
            model: TraceModel::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &TraceCatalog {
        &self.catalog
    }

    /// Load `combination`, stage its model for `goal` and solve it
    ///
    /// A solver that stops answering counts as an unsat answer without core.
    pub fn solve_combination(
        &mut self,
        combination: &TraceCombination,
        goal: BugGoal,
    ) -> SearchResult<SolverResponse> {
        info!(combination = combination_key(combination), ?goal, "Solving trace combination");
        stage_combination(
            &mut self.session,
            &self.catalog,
            &mut self.model,
            combination,
            goal,
        )?;
        match self.session.solve() {
            Ok(response) => Ok(response),
            Err(err) if err.is_recoverable() => {
                warn!(%err, "Solver gave no answer; treating combination as unsat");
                Ok(SolverResponse::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Search the trace space for a schedule that fails the assertion
    ///
    /// Recorded production runs are tried first, then the explorer takes
    /// over from the initial combination. On success the schedule is written
    /// to the solution file and its values next to it.
    pub fn find_failing_schedule(&mut self) -> SearchResult<Option<FailingSchedule>> {
        let started = Instant::now();
        let initial = self
            .catalog
            .initial_combination()
            .ok_or_else(|| SearchError::NoTraces(self.config.trace_folder.clone()))?;

        let runs = self.catalog.production_runs();
        let mut initial_core = None;
        let mut initial_tried = false;
        for (i, run) in runs.iter().enumerate() {
            info!(run = i + 1, total = runs.len(), "Trying production run");
            let response = self.solve_combination(run, BugGoal::Reproduce)?;
            if response.is_sat() {
                let found = self.finish(run, &response, ExplorerStats::default(), true)?;
                info!(elapsed = ?started.elapsed(), "Failing schedule found on a production run");
                return Ok(Some(found));
            }
            if *run == initial {
                initial_core = response.unsat_core;
                initial_tried = true;
            }
        }

        let mut explorer = Explorer::new(self.config.explorer.clone(), initial.clone());
        for run in &runs {
            explorer.mark_tested(run);
        }
        let mut core = None;
        if initial_tried {
            explorer.resume_from(initial.clone());
            core = initial_core;
        }

        loop {
            let next = {
                let mut ctx = SearchContext {
                    session: &mut self.session,
                    catalog: &mut self.catalog,
                    synthesizer: self.synthesizer.as_mut(),
                    model: &mut self.model,
                    reference: &initial,
                };
                explorer.next_combination(core.as_ref(), &mut ctx)?
            };
            let Some(combination) = next else {
                info!(
                    attempts = explorer.stats().attempts,
                    elapsed = ?started.elapsed(),
                    "No failing schedule found"
                );
                return Ok(None);
            };
            let response = self.solve_combination(&combination, BugGoal::Reproduce)?;
            if response.is_sat() {
                let stats = explorer.stats();
                let found = self.finish(&combination, &response, stats, false)?;
                info!(
                    attempts = stats.attempts,
                    branch_flips = stats.branch_flips,
                    elapsed = ?started.elapsed(),
                    "Failing schedule found"
                );
                return Ok(Some(found));
            }
            core = response.unsat_core;
        }
    }

    /// Optionally simplify, then persist a satisfying answer
    fn finish(
        &mut self,
        combination: &TraceCombination,
        response: &SolverResponse,
        stats: ExplorerStats,
        production_run: bool,
    ) -> SearchResult<FailingSchedule> {
        let mut schedule = response.schedule()?;
        let mut values = response.values.clone();
        info!(
            operations = schedule.len(),
            context_switches = schedule.context_switches(),
            "Failing schedule"
        );

        if self.config.csr {
            let simplified = simplify(&schedule, &mut self.session)?;
            if simplified.context_switches() < schedule.context_switches() {
                let pinned = self.session.solve_with_solution(&simplified, false)?;
                if pinned.response.is_sat() {
                    values = pinned.response.values;
                    schedule = simplified;
                } else {
                    warn!("Simplified schedule was rejected on re-check; keeping the original");
                }
            }
        }

        SolutionFile::new(combination.clone(), schedule.clone()).save(&self.config.solution_file)?;
        save_values(&self.config.values_file(), &values)?;
        debug!(schedule = %schedule.pretty(), "Saved failing schedule");

        Ok(FailingSchedule {
            combination: combination.clone(),
            schedule,
            values,
            stats,
            production_run,
        })
    }

    /// Find the event pair whose order causes the failure in the saved schedule
    ///
    /// Falls back to reads feeding the bug condition, then to exploring
    /// other combinations for any bug-avoiding schedule. The alternate
    /// schedule is saved next to the solution file.
    pub fn find_root_cause(&mut self) -> SearchResult<Option<RootCause>> {
        let started = Instant::now();
        let solution_path = self.config.solution_file.clone();
        let solution = SolutionFile::load(&solution_path)?;
        if solution.combination.is_empty() {
            return Err(SearchError::MissingCombination(solution_path));
        }
        let sts = self.config.synthesis_output_dir();
        if sts.is_dir() {
            let added = self.catalog.load_dir(&sts)?;
            debug!(added, dir = %sts.display(), "Loaded synthesized traces");
        }

        let combination = solution.combination;
        let failing = solution.schedule;
        stage_combination(
            &mut self.session,
            &self.catalog,
            &mut self.model,
            &combination,
            BugGoal::Reproduce,
        )?;

        let pinned = self.session.solve_with_solution(&failing, true)?;
        if pinned.response.is_sat() {
            warn!("Saved schedule does not force the failure");
        }
        let core_ids = pinned
            .response
            .unsat_core
            .as_ref()
            .map(|core| core.solution_indices())
            .unwrap_or_default();
        let core = extend_core_to_lock(&failing, core_window(&core_ids));
        let core_start = core.first().copied().unwrap_or(0);
        debug!(?core, "Unsat core window");

        let bug_ops = bug_positions(&failing, &pinned.bug_condition_ops);
        info!(operations = bug_ops.len(), core_start, "Generating event pairs");

        let pairs = generate_event_pairs(&failing, &bug_ops, core_start);
        let mut found = try_event_pairs(&failing, &pairs, |candidate| {
            avoids_bug(&mut self.session, candidate)
        })?;
        if found.is_none() {
            let reads = reads_before(&failing, &bug_ops);
            info!(reads = reads.len(), "Trying reads that feed the bug condition");
            let pairs = generate_event_pairs(&failing, &reads, core_start);
            found = try_event_pairs(&failing, &pairs, |candidate| {
                avoids_bug(&mut self.session, candidate)
            })?;
        }

        let cause = match found {
            Some((pair, schedule)) => {
                let pinned = self.session.solve_with_solution(&schedule, true)?;
                Some(RootCause {
                    pair: Some(pair),
                    schedule,
                    values: pinned.response.values,
                    combination: combination.clone(),
                })
            }
            None => {
                info!("No event pair avoids the bug; exploring other trace combinations");
                self.explore_alternate(&combination, &failing)?
            }
        };

        match &cause {
            Some(cause) => {
                let alternate = self.config.alternate_solution_file();
                save_alternate(&alternate, cause)?;
                match &cause.pair {
                    Some(pair) => info!(cause = pair.cause(), elapsed = ?started.elapsed(), "Root cause found"),
                    None => info!(elapsed = ?started.elapsed(), "Bug-avoiding schedule found by exploration"),
                }
            }
            None => info!(elapsed = ?started.elapsed(), "No bug-avoiding schedule found"),
        }
        Ok(cause)
    }

    /// Explore combinations around the failing one for a bug-avoiding schedule
    fn explore_alternate(
        &mut self,
        failing_combination: &TraceCombination,
        failing: &Schedule,
    ) -> SearchResult<Option<RootCause>> {
        let response = self.solve_combination(failing_combination, BugGoal::Avoid)?;
        if response.is_sat() {
            return Ok(Some(RootCause {
                pair: None,
                schedule: response.schedule()?,
                values: response.values,
                combination: failing_combination.clone(),
            }));
        }

        let mut explorer = Explorer::new(self.config.explorer.clone(), failing_combination.clone());
        explorer.resume_from(failing_combination.clone());
        explorer.seed_branches(failing)?;
        let mut core = response.unsat_core;

        loop {
            let next = {
                let mut ctx = SearchContext {
                    session: &mut self.session,
                    catalog: &mut self.catalog,
                    synthesizer: self.synthesizer.as_mut(),
                    model: &mut self.model,
                    reference: failing_combination,
                };
                explorer.next_combination(core.as_ref(), &mut ctx)?
            };
            let Some(combination) = next else {
                return Ok(None);
            };
            let response = self.solve_combination(&combination, BugGoal::Avoid)?;
            if response.is_sat() {
                return Ok(Some(RootCause {
                    pair: None,
                    schedule: response.schedule()?,
                    values: response.values,
                    combination,
                }));
            }
            core = response.unsat_core;
        }
    }

    /// Shut the solver down
    pub fn close(&mut self) {
        self.session.close();
    }
}

/// Parse `combination` into `model`, then stage the formula for `goal`
fn stage_combination(
    session: &mut SolverSession,
    catalog: &TraceCatalog,
    model: &mut TraceModel,
    combination: &TraceCombination,
    goal: BugGoal,
) -> SearchResult<ConstraintStats> {
    catalog.load_into(model, combination)?;
    let constraints = build_constraint_model(model, goal.invert(model.failed_execution));
    info!("Constraint statistics\n{}", constraints.stats);
    session.stage(&constraints.formula)?;
    Ok(constraints.stats)
}

/// Whether `candidate` is feasible with the bug condition negated
fn avoids_bug(session: &mut SolverSession, candidate: &Schedule) -> SearchResult<bool> {
    match session.solve_with_solution(candidate, true) {
        Ok(pinned) => Ok(pinned.response.is_sat()),
        Err(err) if err.is_recoverable() => {
            warn!(%err, "Solver gave no answer for candidate schedule");
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

fn save_alternate(path: &Path, cause: &RootCause) -> SearchResult<()> {
    SolutionFile::new(cause.combination.clone(), cause.schedule.clone()).save(path)?;
    save_values(&values_path_for(path), &cause.values)?;
    Ok(())
}

/// Borrowed view of the engine handed to the explorer
struct SearchContext<'a> {
    session: &'a mut SolverSession,
    catalog: &'a mut TraceCatalog,
    synthesizer: &'a mut dyn Synthesizer,
    model: &'a mut TraceModel,
    /// Combination whose schedule seeds the branch flips
    reference: &'a TraceCombination,
}

impl ExplorationContext for SearchContext<'_> {
    fn reference_schedule(&mut self) -> SearchResult<Schedule> {
        stage_combination(
            self.session,
            self.catalog,
            self.model,
            self.reference,
            BugGoal::Avoid,
        )?;
        let response = self.session.solve()?;
        if !response.is_sat() {
            return Err(SearchError::NoFeasibleSchedule);
        }
        Ok(response.schedule()?)
    }

    fn synthesize(
        &mut self,
        thread: &ThreadId,
        position: usize,
    ) -> SearchResult<SynthesisOutcome> {
        self.synthesizer.synthesize(thread, position, self.catalog)
    }

    fn trie(&self, thread: &ThreadId) -> Option<&PathTrie> {
        self.catalog.trie(thread)
    }
}
