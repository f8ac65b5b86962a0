//! Context-switch reduction
//!
//! A schedule is simplified by pulling a thread's later TEI up against its
//! previous one, keeping each move only if the pinned order stays feasible.
//! The pass runs forward and over the mirrored schedule until an iteration
//! no longer lowers the number of context switches.

use crate::error::SearchResult;
use schedsmith_smt::SolverSession;
use schedsmith_trace::Schedule;
use tracing::{debug, info, warn};

/// Decides whether a fully pinned order satisfies the constraint model
pub trait FeasibilityOracle {
    fn is_feasible(&mut self, schedule: &Schedule) -> SearchResult<bool>;
}

impl FeasibilityOracle for SolverSession {
    fn is_feasible(&mut self, schedule: &Schedule) -> SearchResult<bool> {
        match self.solve_with_solution(schedule, false) {
            Ok(pinned) => Ok(pinned.response.is_sat()),
            Err(err) if err.is_recoverable() => {
                warn!(%err, "Treating unanswered feasibility query as infeasible");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl<F> FeasibilityOracle for F
where
    F: FnMut(&Schedule) -> bool,
{
    fn is_feasible(&mut self, schedule: &Schedule) -> SearchResult<bool> {
        Ok(self(schedule))
    }
}

/// One forward pass; with `mirrored` the oracle sees the reversed order
fn move_up<O: FeasibilityOracle + ?Sized>(
    schedule: &Schedule,
    oracle: &mut O,
    mirrored: bool,
) -> SearchResult<Schedule> {
    let mut best = schedule.clone();
    for pos in 0..schedule.len() {
        if !best.is_last_of_tei(pos) {
            continue;
        }
        let Some(next) = best.next_in_thread(pos) else {
            continue;
        };
        let candidate = best.move_tei(pos, next);
        let feasible = if mirrored {
            oracle.is_feasible(&candidate.reversed())?
        } else {
            oracle.is_feasible(&candidate)?
        };
        if feasible {
            debug!(pos, next, "Moved TEI");
            best = candidate;
        }
    }
    Ok(best)
}

fn move_down<O: FeasibilityOracle + ?Sized>(
    schedule: &Schedule,
    oracle: &mut O,
) -> SearchResult<Schedule> {
    Ok(move_up(&schedule.reversed(), oracle, true)?.reversed())
}

/// Reduce context switches of a feasible `schedule`
///
/// The result is feasible and never has more context switches than the input.
pub fn simplify<O: FeasibilityOracle + ?Sized>(
    schedule: &Schedule,
    oracle: &mut O,
) -> SearchResult<Schedule> {
    info!(
        context_switches = schedule.context_switches(),
        "Context switch reduction"
    );
    let mut best = schedule.clone();
    let mut current = schedule.clone();
    let mut iterations = 0;
    loop {
        current = move_up(&current, oracle, false)?;
        current = move_down(&current, oracle)?;
        if current.context_switches() < best.context_switches() {
            best = current.clone();
            iterations += 1;
            debug!(
                iterations,
                context_switches = best.context_switches(),
                "Simplified"
            );
        } else {
            break;
        }
    }
    info!(
        iterations,
        context_switches = best.context_switches(),
        "Context switch reduction finished"
    );
    Ok(best)
}
