//! Trace-space exploration
//!
//! Picks the next combination of per-thread paths after an attempt failed.
//! An unsat core with one path condition that conflicts with the bug
//! condition points at a single branch to flip. Otherwise the `D` branches
//! closest to the assertion in a reference schedule are flipped, subset by
//! subset, with up to `N` extra breadth-first picks per subset. Traces that
//! are missing for a flipped prefix are requested from the synthesizer.

use crate::config::{ExplorerConfig, MAX_DISTANCE};
use crate::error::{SearchError, SearchResult};
use crate::synthesis::SynthesisOutcome;
use crate::trie::PathTrie;
use schedsmith_smt::{PathConditionLabel, UnsatCore};
use schedsmith_trace::{combination_key, OrderName, Schedule, ThreadId, TraceCombination};
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

/// Offset of the first branch outcome in a path id (`-1` is the root)
const PATH_ROOT_LEN: usize = 2;

/// What the explorer needs from the engine driving it
pub trait ExplorationContext {
    /// A feasible schedule of the current combination with the bug condition as recorded
    fn reference_schedule(&mut self) -> SearchResult<Schedule>;

    /// Ask for traces of `thread` with branch `position` flipped
    fn synthesize(&mut self, thread: &ThreadId, position: usize)
        -> SearchResult<SynthesisOutcome>;

    fn trie(&self, thread: &ThreadId) -> Option<&PathTrie>;
}

/// Counters reported at the end of a search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExplorerStats {
    /// Combinations handed out
    pub attempts: usize,
    /// Branch subsets fully explored
    pub branch_flips: usize,
}

/// All non-empty subsets of `0..n`, by size and then lexicographically
///
/// Fails for `n` past [`MAX_DISTANCE`].
pub fn branch_subsets(n: usize) -> SearchResult<Vec<Vec<usize>>> {
    if n > MAX_DISTANCE {
        return Err(SearchError::InvalidConfig(format!(
            "cannot flip {n} branches, at most {MAX_DISTANCE}"
        )));
    }
    let mut subsets: Vec<Vec<usize>> = (1u64..(1u64 << n))
        .map(|mask| (0..n).filter(|i| mask & (1 << i) != 0).collect())
        .collect();
    subsets.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    Ok(subsets)
}

/// `path` with the outcome at `pos` inverted
fn flip_at(path: &str, pos: usize) -> Option<String> {
    let mut chars: Vec<char> = path.chars().collect();
    let outcome = chars.get_mut(pos)?;
    *outcome = if *outcome == '0' { '1' } else { '0' };
    Some(chars.into_iter().collect())
}

fn prefix_of(path: &str, len: usize) -> String {
    path.chars().take(len).collect()
}

/// `candidate` only adds iterations in front of `previous`'s tail
fn looks_like_loop(previous: &str, candidate: &str) -> bool {
    previous
        .get(1..)
        .is_some_and(|tail| !tail.is_empty() && candidate.ends_with(tail))
}

/// Search state over trace combinations
#[derive(Debug)]
pub struct Explorer {
    config: ExplorerConfig,
    initial: TraceCombination,
    current: TraceCombination,
    tested: HashSet<String>,
    started: bool,
    /// Branches closest to the assertion, nearest first
    closest_branches: Vec<OrderName>,
    seeded: bool,
    subsets: VecDeque<Vec<usize>>,
    /// Indices into `closest_branches` flipped by the next branch flip
    active: Option<Vec<usize>>,
    bfs: usize,
    stats: ExplorerStats,
}

impl Explorer {
    pub fn new(config: ExplorerConfig, initial: TraceCombination) -> Self {
        Self {
            config,
            current: initial.clone(),
            initial,
            tested: HashSet::new(),
            started: false,
            closest_branches: Vec::new(),
            seeded: false,
            subsets: VecDeque::new(),
            active: None,
            bfs: 0,
            stats: ExplorerStats::default(),
        }
    }

    pub fn stats(&self) -> ExplorerStats {
        self.stats
    }

    pub fn current(&self) -> &TraceCombination {
        &self.current
    }

    pub fn closest_branches(&self) -> &[OrderName] {
        &self.closest_branches
    }

    /// Continue from `combination`, which counts as already handed out
    pub fn resume_from(&mut self, combination: TraceCombination) {
        self.tested.insert(combination_key(&combination));
        self.initial = combination.clone();
        self.current = combination;
        self.started = true;
    }

    /// Remember a combination as tested without handing it out
    pub fn mark_tested(&mut self, combination: &TraceCombination) {
        self.tested.insert(combination_key(combination));
    }

    /// True the first time `combination` is presented
    pub fn is_new_combination(&mut self, combination: &TraceCombination) -> bool {
        self.tested.insert(combination_key(combination))
    }

    /// Whether another combination may still be produced
    pub fn has_next(&self) -> bool {
        !self.seeded || self.active.is_some()
    }

    /// Take the branches to flip from `schedule`, nearest to its end first
    pub fn seed_branches(&mut self, schedule: &Schedule) -> SearchResult<()> {
        self.closest_branches = schedule
            .iter()
            .rev()
            .filter(|op| op.branch_seq().is_some())
            .take(self.config.max_distance)
            .cloned()
            .collect();
        self.seeded = true;
        self.subsets = branch_subsets(self.closest_branches.len())?.into();
        self.active = self.subsets.pop_front();
        self.bfs = 0;
        info!(
            branches = self.closest_branches.len(),
            subsets = self.subsets.len() + usize::from(self.active.is_some()),
            "Seeded branch flips"
        );
        Ok(())
    }

    /// Combination to try after the previous one failed with `core`
    ///
    /// The first call hands out the initial combination. Returns None once
    /// every branch subset has been explored.
    pub fn next_combination<C: ExplorationContext>(
        &mut self,
        core: Option<&UnsatCore>,
        ctx: &mut C,
    ) -> SearchResult<Option<TraceCombination>> {
        if !self.started {
            self.started = true;
            self.current = self.initial.clone();
            self.tested.insert(combination_key(&self.current));
            self.stats.attempts += 1;
            return Ok(Some(self.current.clone()));
        }
        if !self.has_next() {
            info!("No more combinations left");
            return Ok(None);
        }

        let labels = core.map(UnsatCore::path_conditions).unwrap_or_default();
        let conflicts_with_bug = labels.iter().any(|pc| pc.bug_condition);
        let candidates: Vec<PathConditionLabel> =
            labels.into_iter().filter(|pc| !pc.bug_condition).collect();

        match candidates.as_slice() {
            [pc] if conflicts_with_bug => self.flip_path_condition(pc, ctx)?,
            [] => {
                info!("Unsat core has no path conditions; flipping the branches closest to the assertion");
                self.flip_branch(ctx)?;
            }
            [_] => {
                info!("Path conditions in the unsat core do not conflict with the bug condition; flipping the branches closest to the assertion");
                self.flip_branch(ctx)?;
            }
            _ => {
                info!(
                    count = candidates.len(),
                    "Unsat core has too many path conditions; flipping the branches closest to the assertion"
                );
                self.flip_branch(ctx)?;
            }
        }

        loop {
            let combination = self.current.clone();
            if self.is_new_combination(&combination) {
                break;
            }
            if !self.has_next() {
                info!("No more combinations left");
                return Ok(None);
            }
            debug!("Combination was already tested; picking another one");
            self.flip_branch(ctx)?;
        }

        self.stats.attempts += 1;
        Ok(Some(self.current.clone()))
    }

    /// Flip the branch behind a conflicting path condition
    fn flip_path_condition<C: ExplorationContext>(
        &mut self,
        pc: &PathConditionLabel,
        ctx: &mut C,
    ) -> SearchResult<()> {
        let pos = pc.index + PATH_ROOT_LEN;
        let thread = &pc.thread;
        let flipped = self
            .current
            .get(thread)
            .and_then(|path| flip_at(path, pos));
        let Some(flipped) = flipped else {
            warn!(thread = %thread, pos, "Path condition outside the chosen path; flipping closest branches");
            return self.flip_branch(ctx);
        };
        let prefix = prefix_of(&flipped, pos + 1);
        info!(thread = %thread, pos, prefix, "Flipping branch of conflicting path condition");

        if !ctx.trie(thread).is_some_and(|t| t.contains_prefix(&prefix)) {
            info!(prefix, "No trace with this prefix; running symbolic execution");
            if ctx.synthesize(thread, pc.index)? == SynthesisOutcome::Infeasible {
                self.bfs = self.config.max_bfs;
            }
        }
        match ctx.trie(thread).filter(|t| t.contains_prefix(&prefix)) {
            Some(trie) => {
                let path = trie.path_by_prefix(&prefix, self.bfs);
                info!(thread = %thread, path, pick = self.bfs, "Picked trace");
                self.current.insert(thread.clone(), path);
            }
            None => info!(prefix, "No trace found with prefix"),
        }
        Ok(())
    }

    /// Flip the active subset of the closest branches, then advance
    fn flip_branch<C: ExplorationContext>(&mut self, ctx: &mut C) -> SearchResult<()> {
        if !self.seeded {
            info!("Computing reference schedule");
            let reference = ctx.reference_schedule()?;
            self.seed_branches(&reference)?;
        }
        if self.bfs == 0 {
            self.current = self.initial.clone();
        }
        let Some(active) = self.active.clone() else {
            self.advance();
            return Ok(());
        };

        let mut min_flip_pos: Option<usize> = None;
        // Per thread: the path with the branches flipped so far in this subset
        let mut flipped_paths: BTreeMap<ThreadId, String> = BTreeMap::new();

        for &index in active.iter().rev() {
            let branch = self.closest_branches[index].clone();
            let Some(seq) = branch.branch_seq() else {
                continue;
            };
            let thread = branch.thread().clone();
            let pos = seq + PATH_ROOT_LEN;
            // synthesis starts from the most general flipped branch
            let min_pos = min_flip_pos.map_or(pos, |min: usize| min.min(pos));
            min_flip_pos = Some(min_pos);

            let base = flipped_paths
                .get(&thread)
                .or_else(|| self.initial.get(&thread))
                .cloned();
            let Some(flipped) = base.as_deref().and_then(|path| flip_at(path, pos)) else {
                warn!(branch = %branch, "Branch lies outside the thread's path");
                continue;
            };
            let prefix = prefix_of(&flipped, pos + 1);
            flipped_paths.insert(thread.clone(), flipped);
            info!(branch = %branch, prefix, "Next branch to flip");

            let mut use_synthesis = false;
            match ctx.trie(&thread).filter(|t| t.contains_prefix(&prefix)) {
                Some(trie) => {
                    let candidate = trie.path_by_prefix(&prefix, self.bfs);
                    let previous = self.current.get(&thread).cloned().unwrap_or_default();
                    if candidate == previous {
                        info!(thread = %thread, path = candidate, "Only trace for this prefix");
                        self.bfs = self.config.max_bfs;
                    } else if self.bfs <= 1 && looks_like_loop(&previous, &candidate) {
                        info!(thread = %thread, path = candidate, "Trace looks like a loop iteration; running symbolic execution");
                        use_synthesis = true;
                    } else {
                        info!(thread = %thread, path = candidate, pick = self.bfs, "Picked trace");
                        self.current.insert(thread.clone(), candidate);
                    }
                }
                None => {
                    info!(prefix, "No trace with this prefix; running symbolic execution");
                    use_synthesis = true;
                }
            }

            if use_synthesis {
                let position = min_pos - PATH_ROOT_LEN;
                if ctx.synthesize(&thread, position)? == SynthesisOutcome::Infeasible {
                    self.bfs = self.config.max_bfs;
                }
                match ctx.trie(&thread).filter(|t| t.contains_prefix(&prefix)) {
                    Some(trie) => {
                        let path = trie.path_by_prefix(&prefix, self.bfs);
                        info!(thread = %thread, path, pick = self.bfs, "Picked trace");
                        self.current.insert(thread.clone(), path);
                    }
                    None => {
                        info!(prefix, "No trace found with prefix");
                        self.bfs = self.config.max_bfs;
                    }
                }
            }
        }

        self.advance();
        Ok(())
    }

    /// Next breadth-first pick of the active subset, or the next subset
    fn advance(&mut self) {
        if self.active.is_some() && self.bfs < self.config.max_bfs {
            self.bfs += 1;
            return;
        }
        if self.active.is_some() {
            self.stats.branch_flips += 1;
        }
        self.bfs = 0;
        self.active = self.subsets.pop_front();
        debug!(subset = ?self.active, "Next branch subset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockContext {
        reference: Schedule,
        tries: BTreeMap<ThreadId, PathTrie>,
        outcome: SynthesisOutcome,
        /// Paths that appear once synthesis runs
        synthesized_paths: Vec<(ThreadId, String)>,
        requests: Vec<(ThreadId, usize)>,
        reference_requests: usize,
    }

    impl MockContext {
        fn new(branches: &[&str], paths: &[(&str, &str)]) -> Self {
            let mut tries: BTreeMap<ThreadId, PathTrie> = BTreeMap::new();
            for (thread, path) in paths {
                tries.entry(ThreadId::from(*thread)).or_default().insert(path);
            }
            Self {
                reference: Schedule::parse_names(branches).unwrap(),
                tries,
                outcome: SynthesisOutcome::Unavailable,
                synthesized_paths: Vec::new(),
                requests: Vec::new(),
                reference_requests: 0,
            }
        }
    }

    impl ExplorationContext for MockContext {
        fn reference_schedule(&mut self) -> SearchResult<Schedule> {
            self.reference_requests += 1;
            Ok(self.reference.clone())
        }

        fn synthesize(
            &mut self,
            thread: &ThreadId,
            position: usize,
        ) -> SearchResult<SynthesisOutcome> {
            self.requests.push((thread.clone(), position));
            for (t, path) in self.synthesized_paths.drain(..) {
                self.tries.entry(t).or_default().insert(&path);
            }
            Ok(self.outcome)
        }

        fn trie(&self, thread: &ThreadId) -> Option<&PathTrie> {
            self.tries.get(thread)
        }
    }

    fn comb(entries: &[(&str, &str)]) -> TraceCombination {
        entries
            .iter()
            .map(|(t, p)| (ThreadId::from(*t), p.to_string()))
            .collect()
    }

    fn explorer(d: usize, n: usize, initial: TraceCombination) -> Explorer {
        Explorer::new(
            ExplorerConfig::new().with_max_distance(d).with_max_bfs(n),
            initial,
        )
    }

    #[test]
    fn test_branch_subsets_order() {
        assert_eq!(
            branch_subsets(3).unwrap(),
            vec![
                vec![0],
                vec![1],
                vec![2],
                vec![0, 1],
                vec![0, 2],
                vec![1, 2],
                vec![0, 1, 2]
            ]
        );
        assert!(branch_subsets(0).unwrap().is_empty());
    }

    #[test]
    fn test_branch_subsets_reject_wide_masks() {
        assert!(matches!(branch_subsets(64), Err(SearchError::InvalidConfig(_))));
        assert!(matches!(branch_subsets(usize::MAX), Err(SearchError::InvalidConfig(_))));
    }

    #[test]
    fn test_seeding_past_mask_width_fails() {
        let names: Vec<String> = (0..70).map(|i| format!("branch-1-{i}")).collect();
        let reference = Schedule::parse_names(&names).unwrap();
        let mut ex = explorer(70, 0, comb(&[("1", "-1")]));
        assert!(ex.seed_branches(&reference).is_err());
    }

    #[test]
    fn test_flip_helpers() {
        assert_eq!(flip_at("-100", 3).unwrap(), "-101");
        assert_eq!(flip_at("-101", 2).unwrap(), "-111");
        assert!(flip_at("-10", 5).is_none());
        assert!(looks_like_loop("-10", "-1110"));
        assert!(!looks_like_loop("-10", "-111"));
        assert!(!looks_like_loop("", "-1"));
    }

    #[test]
    fn test_first_combination_is_initial_and_deduplicated() {
        let initial = comb(&[("0", "-1"), ("1", "-10")]);
        let mut ex = explorer(4, 0, initial.clone());
        let mut ctx = MockContext::new(&[], &[]);
        assert!(ex.has_next());
        assert_eq!(ex.next_combination(None, &mut ctx).unwrap(), Some(initial.clone()));
        assert!(!ex.is_new_combination(&initial));
        assert!(ex.is_new_combination(&comb(&[("0", "-1"), ("1", "-11")])));
        assert_eq!(ex.stats().attempts, 1);
    }

    #[test]
    fn test_branch_subsets_are_flipped_in_order() {
        let mut ex = explorer(2, 0, comb(&[("1", "-100")]));
        let mut ctx = MockContext::new(
            &["branch-1-0", "branch-1-1"],
            &[("1", "-100"), ("1", "-110"), ("1", "-101"), ("1", "-111")],
        );

        ex.next_combination(None, &mut ctx).unwrap();
        let picks: Vec<String> = std::iter::from_fn(|| {
            ex.next_combination(None, &mut ctx)
                .unwrap()
                .map(|c| c[&ThreadId::from("1")].clone())
        })
        .collect();

        // nearest branch (seq 1) alone, then seq 0 alone, then both
        assert_eq!(picks, vec!["-101", "-110", "-111"]);
        assert_eq!(ctx.reference_requests, 1);
        assert!(ctx.requests.is_empty());
        assert!(!ex.has_next());
        assert_eq!(ex.stats().branch_flips, 3);
        assert_eq!(ex.stats().attempts, 4);
    }

    #[test]
    fn test_max_distance_limits_branches() {
        let mut ex = explorer(1, 0, comb(&[("1", "-100")]));
        let mut ctx = MockContext::new(&["branch-1-0", "branch-1-1"], &[("1", "-101")]);
        ex.next_combination(None, &mut ctx).unwrap();
        let next = ex.next_combination(None, &mut ctx).unwrap().unwrap();
        assert_eq!(next[&ThreadId::from("1")], "-101");
        assert_eq!(ex.closest_branches().len(), 1);
        assert_eq!(ex.next_combination(None, &mut ctx).unwrap(), None);
    }

    #[test]
    fn test_conflicting_path_condition_is_flipped() {
        let mut ex = explorer(4, 0, comb(&[("1", "-100"), ("2", "-1")]));
        let mut ctx = MockContext::new(&[], &[("1", "-100"), ("1", "-110")]);
        ex.next_combination(None, &mut ctx).unwrap();

        let core = UnsatCore::parse("(PC0_T1 PC3_T2_BUGCOND RWC4)");
        let next = ex.next_combination(Some(&core), &mut ctx).unwrap().unwrap();
        assert_eq!(next[&ThreadId::from("1")], "-110");
        assert_eq!(next[&ThreadId::from("2")], "-1");
        assert_eq!(ctx.reference_requests, 0);
    }

    #[test]
    fn test_missing_prefix_triggers_synthesis() {
        let mut ex = explorer(4, 0, comb(&[("1", "-100")]));
        let mut ctx = MockContext::new(&[], &[("1", "-100")]);
        ctx.outcome = SynthesisOutcome::Completed { added: 1 };
        ctx.synthesized_paths = vec![(ThreadId::from("1"), "-1010".to_string())];
        ex.next_combination(None, &mut ctx).unwrap();

        let core = UnsatCore::parse("(PC1_T1 PC0_T1_BUGCOND)");
        let next = ex.next_combination(Some(&core), &mut ctx).unwrap().unwrap();
        assert_eq!(ctx.requests, vec![(ThreadId::from("1"), 1)]);
        assert_eq!(next[&ThreadId::from("1")], "-1010");
    }

    #[test]
    fn test_loop_like_completion_prefers_synthesis() {
        let mut ex = explorer(1, 0, comb(&[("1", "-10")]));
        let mut ctx = MockContext::new(&["branch-1-0"], &[("1", "-10"), ("1", "-1110")]);
        ctx.outcome = SynthesisOutcome::Completed { added: 1 };
        ctx.synthesized_paths = vec![(ThreadId::from("1"), "-11".to_string())];
        ex.next_combination(None, &mut ctx).unwrap();

        let next = ex.next_combination(None, &mut ctx).unwrap().unwrap();
        assert_eq!(ctx.requests, vec![(ThreadId::from("1"), 0)]);
        assert_eq!(next[&ThreadId::from("1")], "-11");
    }

    #[test]
    fn test_infeasible_flip_exhausts_search() {
        let mut ex = explorer(1, 2, comb(&[("1", "-10")]));
        let mut ctx = MockContext::new(&["branch-1-0"], &[("1", "-10")]);
        ctx.outcome = SynthesisOutcome::Infeasible;
        ex.next_combination(None, &mut ctx).unwrap();
        assert_eq!(ex.next_combination(None, &mut ctx).unwrap(), None);
        assert_eq!(ctx.requests.len(), 1);
    }

    #[test]
    fn test_no_branches_means_no_more_combinations() {
        let mut ex = explorer(4, 0, comb(&[("1", "-1")]));
        let mut ctx = MockContext::new(&["OS-exit-1&a.c@9"], &[("1", "-1")]);
        ex.next_combination(None, &mut ctx).unwrap();
        assert_eq!(ex.next_combination(None, &mut ctx).unwrap(), None);
        assert!(!ex.has_next());
    }

    #[test]
    fn test_breadth_first_picks_per_subset() {
        let mut ex = explorer(1, 1, comb(&[("1", "-10")]));
        let mut ctx = MockContext::new(&["branch-1-0"], &[("1", "-10"), ("1", "-11"), ("1", "-110")]);
        ex.next_combination(None, &mut ctx).unwrap();
        let first = ex.next_combination(None, &mut ctx).unwrap().unwrap();
        let second = ex.next_combination(None, &mut ctx).unwrap().unwrap();
        assert_eq!(first[&ThreadId::from("1")], "-11");
        assert_eq!(second[&ThreadId::from("1")], "-110");
        assert_eq!(ex.next_combination(None, &mut ctx).unwrap(), None);
    }

    #[test]
    fn test_resume_skips_failing_combination() {
        let failing = comb(&[("1", "-10")]);
        let mut ex = explorer(1, 0, comb(&[("1", "-1")]));
        ex.resume_from(failing.clone());
        ex.seed_branches(&Schedule::parse_names(["branch-1-0"]).unwrap())
            .unwrap();
        let mut ctx = MockContext::new(&[], &[("1", "-10"), ("1", "-11")]);
        let next = ex.next_combination(None, &mut ctx).unwrap().unwrap();
        assert_eq!(next[&ThreadId::from("1")], "-11");
        assert_eq!(ctx.reference_requests, 0);
    }
}
