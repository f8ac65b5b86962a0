//! Root-cause search over a failing schedule
//!
//! The failing schedule is pinned and the bug condition inverted; the unsat
//! core then marks the region that forces the failure. Each operation named
//! in the bug condition is paired with later operations of other threads,
//! and every pair is tried swapped. A swap that makes the inverted model
//! satisfiable is the root cause.

use crate::error::SearchResult;
use schedsmith_trace::{OrderName, Schedule};
use std::fmt;
use tracing::{debug, info, warn};

/// Inclusive range of schedule positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

impl Segment {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// A single position
    pub fn at(pos: usize) -> Self {
        Self::new(pos, pos)
    }

    fn label(&self, schedule: &Schedule) -> String {
        if self.start == self.end {
            schedule[self.start].to_string()
        } else {
            format!("[{}..{}]", schedule[self.start], schedule[self.end])
        }
    }
}

/// Two segments of a schedule, `first` starting earlier; inverting the pair
/// runs `second` before `first`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPair {
    pub first: Segment,
    pub second: Segment,
    first_label: String,
    second_label: String,
}

impl EventPair {
    pub fn new(first: Segment, second: Segment, schedule: &Schedule) -> Self {
        let (first, second) = if first.start <= second.start {
            (first, second)
        } else {
            (second, first)
        };
        Self {
            first,
            second,
            first_label: first.label(schedule),
            second_label: second.label(schedule),
        }
    }

    /// Reading of a pair whose inversion avoids the bug
    pub fn cause(&self) -> String {
        format!("{} should execute after {}", self.first_label, self.second_label)
    }
}

impl fmt::Display for EventPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} , {})", self.first_label, self.second_label)
    }
}

/// Positions named by the pinning constraints of an unsat core
///
/// `solution<i>` orders positions `i` and `i + 1`, so the position after the
/// first reported constraint is included as well.
pub fn core_window(solution_indices: &[usize]) -> Vec<usize> {
    let Some(&first) = solution_indices.first() else {
        return Vec::new();
    };
    let mut window = solution_indices.to_vec();
    window.push(first + 1);
    window.sort_unstable();
    window.dedup();
    window
}

/// Extend a sorted core that starts inside a critical section back to its lock
///
/// The critical section is closed by the first unlock in the core; the core
/// grows back to the lock of the same object taken by the same thread.
pub fn extend_core_to_lock(schedule: &Schedule, mut core: Vec<usize>) -> Vec<usize> {
    core.retain(|&pos| pos < schedule.len());
    let Some(&first) = core.first() else {
        return core;
    };
    for &pos in &core {
        let op = &schedule[pos];
        if op.is_lock() {
            return core;
        }
        if op.is_unlock() {
            let mut extension = Vec::new();
            for back in (0..first).rev() {
                extension.push(back);
                let candidate = &schedule[back];
                if candidate.is_lock()
                    && candidate.thread() == op.thread()
                    && candidate.var() == op.var()
                {
                    break;
                }
            }
            extension.reverse();
            extension.extend(core);
            return extension;
        }
    }
    core
}

/// Schedule positions of the bug-condition value names (`R-x-1-0`, ...)
pub fn bug_positions<S: AsRef<str>>(schedule: &Schedule, tokens: &[S]) -> Vec<usize> {
    let mut positions = Vec::new();
    for token in tokens {
        let token = token.as_ref();
        match schedule.iter().position(|op| op.matches_value(token)) {
            Some(pos) if !positions.contains(&pos) => positions.push(pos),
            Some(_) => {}
            None => warn!(token, "Bug-condition operation is not in the schedule"),
        }
    }
    positions
}

/// Earlier reads of the variables the operations at `positions` touch
pub fn reads_before(schedule: &Schedule, positions: &[usize]) -> Vec<usize> {
    let mut reads = Vec::new();
    for &pos in positions {
        let var = schedule[pos].var();
        for (earlier, op) in schedule.iter().enumerate().take(pos) {
            if op.is_read() && op.var() == var && !reads.contains(&earlier) {
                reads.push(earlier);
            }
        }
    }
    reads
}

/// Events never worth reordering against
fn is_pair_candidate(op: &OrderName) -> bool {
    if op.branch_seq().is_some() || op.is_read() {
        return false;
    }
    !matches!(
        op.sync_tag(),
        Some("exit" | "Assert" | "join" | "fork" | "start")
    )
}

/// Segment of the operation at `pos`: itself, or the enclosing critical
/// section of its own thread
fn enclosing_segment(schedule: &Schedule, pos: usize) -> Segment {
    let thread = schedule[pos].thread();
    let lock = (0..=pos).rev().find_map(|back| {
        let op = &schedule[back];
        if op.thread() != thread {
            return None;
        }
        if op.is_lock() {
            Some(Some(back))
        } else if op.is_unlock() {
            Some(None)
        } else {
            None
        }
    });
    let Some(Some(start)) = lock else {
        return Segment::at(pos);
    };
    let end = (pos..schedule.len())
        .find(|&fwd| schedule[fwd].is_unlock() && schedule[fwd].thread() == thread)
        .unwrap_or(pos);
    Segment::new(start, end)
}

/// Pairs of each operation at `ops` with later events of other threads
///
/// Candidates start at `core_start`. Pairs come out most recent first.
pub fn generate_event_pairs(schedule: &Schedule, ops: &[usize], core_start: usize) -> Vec<EventPair> {
    let mut pairs = Vec::new();
    for &pos in ops {
        let op = &schedule[pos];
        let segment = enclosing_segment(schedule, pos);
        debug!(op = %op, ?segment, "Event pairs");

        for other in core_start..schedule.len() {
            let candidate = &schedule[other];
            if candidate.thread() == op.thread() || !is_pair_candidate(candidate) {
                continue;
            }
            let other_segment = Segment::at(other);
            let pair = if segment.start < other {
                if segment.end > other {
                    // inside the critical section: only the operation itself moves
                    EventPair::new(Segment::at(pos), other_segment, schedule)
                } else {
                    EventPair::new(segment, other_segment, schedule)
                }
            } else {
                EventPair::new(other_segment, segment, schedule)
            };
            debug!(%pair, "Event pair");
            pairs.push(pair);
        }
    }
    pairs.reverse();
    pairs
}

/// `schedule` with the pair's second segment moved in front of its first
///
/// Events of the second segment's thread between the two segments move
/// along, so every thread keeps its program order.
pub fn generate_new_schedule(schedule: &Schedule, pair: &EventPair) -> Schedule {
    let ops = schedule.as_slice();
    let a = pair.first.start;
    let b = pair.second;
    let thread_b = ops[b.start].thread();

    let mut reordered: Vec<OrderName> = ops[..a].to_vec();
    let mut deferred = Vec::new();
    for op in &ops[a..b.start] {
        if op.thread() == thread_b {
            reordered.push(op.clone());
        } else {
            deferred.push(op.clone());
        }
    }
    for op in &ops[b.start..=b.end] {
        if op.thread() == thread_b {
            reordered.push(op.clone());
        } else {
            deferred.push(op.clone());
        }
    }
    reordered.extend(deferred);
    reordered.extend_from_slice(&ops[b.end + 1..]);
    Schedule::new(reordered)
}

/// Try each pair inverted; the first schedule `avoids_bug` accepts wins
pub fn try_event_pairs<F>(
    schedule: &Schedule,
    pairs: &[EventPair],
    mut avoids_bug: F,
) -> SearchResult<Option<(EventPair, Schedule)>>
where
    F: FnMut(&Schedule) -> SearchResult<bool>,
{
    for (attempt, pair) in pairs.iter().enumerate() {
        info!(attempt = attempt + 1, %pair, "Attempt by inverting pair");
        let candidate = generate_new_schedule(schedule, pair);
        if avoids_bug(&candidate)? {
            info!(cause = pair.cause(), "Found bug-avoiding schedule");
            return Ok(Some((pair.clone(), candidate)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(names: &[&str]) -> Schedule {
        Schedule::parse_names(names).unwrap()
    }

    /// T1 writes x under m; T2 reads x and asserts
    fn failing() -> Schedule {
        schedule(&[
            "OS-start-1&a.c@1",      // 0
            "OS-lock_m-1-0&a.c@2",   // 1
            "OW-x-1-0&a.c@3",        // 2
            "OS-unlock_m-1-0&a.c@4", // 3
            "OS-start-2&b.c@1",      // 4
            "OR-x-2-0&b.c@2",        // 5
            "OW-y-1-0&a.c@5",        // 6
            "OS-Assert-2&b.c@3",     // 7
            "OS-exit-1&a.c@6",       // 8
        ])
    }

    #[test]
    fn test_core_window_includes_successor() {
        assert_eq!(core_window(&[5, 2, 3]), vec![2, 3, 5, 6]);
        assert!(core_window(&[]).is_empty());
    }

    #[test]
    fn test_core_extends_back_to_lock() {
        let s = failing();
        assert_eq!(extend_core_to_lock(&s, vec![3, 4, 5]), vec![1, 2, 3, 4, 5]);
        assert_eq!(extend_core_to_lock(&s, vec![1, 2, 3]), vec![1, 2, 3]);
        assert_eq!(extend_core_to_lock(&s, vec![4, 5]), vec![4, 5]);
        assert!(extend_core_to_lock(&s, vec![]).is_empty());
    }

    #[test]
    fn test_core_extension_skips_unrelated_locks() {
        let s = schedule(&[
            "OS-lock_m-1-0&a.c@1",   // 0
            "OS-lock_n-2-0&b.c@1",   // 1
            "OS-unlock_n-2-0&b.c@2", // 2
            "OS-lock_k-1-0&a.c@2",   // 3
            "OS-unlock_k-1-0&a.c@3", // 4
            "OW-y-1-0&a.c@4",        // 5
            "OS-unlock_m-1-0&a.c@5", // 6
        ]);
        assert_eq!(extend_core_to_lock(&s, vec![5, 6]), (0..=6).collect::<Vec<_>>());
        // a core closing thread 2's section stops at thread 2's lock
        assert_eq!(extend_core_to_lock(&s, vec![2]), vec![1, 2]);
    }

    #[test]
    fn test_bug_positions_and_reads() {
        let s = failing();
        assert_eq!(bug_positions(&s, &["R-x-2-0", "R-z-2-0", "R-x-2-0"]), vec![5]);
        assert_eq!(reads_before(&s, &[6]), Vec::<usize>::new());
        let s2 = schedule(&["OR-x-1-0&a.c@1", "OR-y-1-1&a.c@2", "OW-x-2-0&b.c@1"]);
        assert_eq!(reads_before(&s2, &[2]), vec![0]);
    }

    #[test]
    fn test_enclosing_segment() {
        let s = failing();
        assert_eq!(enclosing_segment(&s, 2), Segment::new(1, 3));
        assert_eq!(enclosing_segment(&s, 5), Segment::at(5));
        assert_eq!(enclosing_segment(&s, 6), Segment::at(6));
    }

    #[test]
    fn test_event_pairs_skip_uninteresting_events() {
        let s = failing();
        let pairs = generate_event_pairs(&s, &[5], 0);
        // only thread 1's lock, write x, unlock and write y qualify
        assert_eq!(pairs.len(), 4);
        assert!(pairs.iter().all(|p| p.first.start <= p.second.start));
        // most recent first
        assert_eq!(pairs[0].second, Segment::at(6));
        assert_eq!(pairs[0].first, Segment::at(5));
    }

    #[test]
    fn test_new_schedule_moves_second_segment_first() {
        let s = failing();
        let pair = EventPair::new(Segment::at(5), Segment::at(6), &s);
        let moved = generate_new_schedule(&s, &pair);
        assert_eq!(moved.len(), s.len());
        assert_eq!(moved[5].as_str(), "OW-y-1-0&a.c@5");
        assert_eq!(moved[6].as_str(), "OR-x-2-0&b.c@2");

        // moving the whole critical section before thread 2's read
        let s = schedule(&[
            "OR-x-2-0&b.c@2",
            "OS-lock_m-1-0&a.c@2",
            "OW-x-1-0&a.c@3",
            "OS-unlock_m-1-0&a.c@4",
        ]);
        let pair = EventPair::new(Segment::at(0), Segment::new(1, 3), &s);
        let moved = generate_new_schedule(&s, &pair);
        assert_eq!(
            moved.to_strings(),
            vec![
                "OS-lock_m-1-0&a.c@2",
                "OW-x-1-0&a.c@3",
                "OS-unlock_m-1-0&a.c@4",
                "OR-x-2-0&b.c@2",
            ]
        );
    }

    #[test]
    fn test_pair_rendering() {
        let s = failing();
        let pair = EventPair::new(Segment::new(1, 3), Segment::at(5), &s);
        assert_eq!(
            pair.to_string(),
            "([OS-lock_m-1-0&a.c@2..OS-unlock_m-1-0&a.c@4] , OR-x-2-0&b.c@2)"
        );
        assert_eq!(
            pair.cause(),
            "[OS-lock_m-1-0&a.c@2..OS-unlock_m-1-0&a.c@4] should execute after OR-x-2-0&b.c@2"
        );
    }

    #[test]
    fn test_try_event_pairs_stops_at_first_success() {
        let s = failing();
        let pairs = generate_event_pairs(&s, &[5], 0);
        let mut tried = 0;
        let found = try_event_pairs(&s, &pairs, |candidate| {
            tried += 1;
            // accept once the write to x follows the read
            let read = candidate.iter().position(|op| op.as_str() == "OR-x-2-0&b.c@2");
            let write = candidate.iter().position(|op| op.as_str() == "OW-x-1-0&a.c@3");
            Ok(read < write)
        })
        .unwrap();
        let (pair, schedule) = found.unwrap();
        assert_eq!(pair.first, Segment::at(2));
        assert_eq!(pair.second, Segment::at(5));
        assert_eq!(schedule.len(), s.len());
        assert_eq!(tried, 3);

        let none = try_event_pairs(&s, &pairs, |_| Ok(false)).unwrap();
        assert!(none.is_none());
    }
}
