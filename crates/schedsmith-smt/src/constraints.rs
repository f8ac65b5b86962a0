//! Constraint Model Generator
//!
//! Encodes the happens-before semantics of one trace combination as a
//! labeled SMT-LIB formula. Each category is emitted in a fixed order:
//!
//! 1. memory order (`MO#`): one bounded order variable per operation,
//!    global distinctness, program order per thread
//! 2. read-write (`RWC#`): last-write-wins with no intervening write,
//!    falling back to the thread's initial value
//! 3. path (`PC#_T<tid>[_BUGCOND]`): recorded branch conditions
//! 4. locking (`LC#`): critical sections of one object never overlap
//! 5. fork/start (`FSC#`) and join/exit (`JEC#`)
//! 6. wait/signal (`WSC#`): 0/1 indicators match signals to waits
//! 7. barrier (`BC#`)
//!
//! Every assertion that can appear in an unsat core carries a label.

use crate::formula::Formula;
use crate::smtlib;
use schedsmith_trace::{
    translator_for, ExpressionTranslator, LockPair, OpKind, Operation, TraceModel,
};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

/// Per-category constraint counts, reported before solving
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConstraintStats {
    pub memory_order: usize,
    pub read_write: usize,
    pub locking: usize,
    pub partial_order: usize,
    pub path: usize,
    pub unknown_vars: usize,
}

impl ConstraintStats {
    pub fn total(&self) -> usize {
        self.memory_order + self.read_write + self.locking + self.partial_order + self.path
    }
}

impl fmt::Display for ConstraintStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.total();
        let percent = |n: usize| {
            if total == 0 {
                0.0
            } else {
                n as f64 * 100.0 / total as f64
            }
        };
        writeln!(f, "{:<12}| #CONSTRAINTS", "TYPE")?;
        writeln!(f, "{}", "-".repeat(30))?;
        for (name, n) in [
            ("Memory", self.memory_order),
            ("ReadWrite", self.read_write),
            ("Locking", self.locking),
            ("PartialOrd", self.partial_order),
            ("Path", self.path),
        ] {
            writeln!(f, "{name:<12}| {n:>8} ({:.1}%)", percent(n))?;
        }
        writeln!(f, "#CONSTRAINTS: {total}")?;
        write!(f, "#UNKNOWN VARS: {}", self.unknown_vars)
    }
}

/// Output of one generator run
#[derive(Debug, Clone)]
pub struct ConstraintModel {
    pub formula: Formula,
    pub stats: ConstraintStats,
    /// Number of order variables; also the schedule length of a model
    pub total_ops: usize,
}

/// Builds the formula for one [`TraceModel`]
pub struct ConstraintModelGenerator<'a> {
    model: &'a TraceModel,
    translator: &'static dyn ExpressionTranslator,
    formula: Formula,
    stats: ConstraintStats,
}

impl<'a> ConstraintModelGenerator<'a> {
    pub fn new(model: &'a TraceModel) -> Self {
        Self {
            model,
            translator: translator_for(model.dialect),
            formula: Formula::new(),
            stats: ConstraintStats::default(),
        }
    }

    /// Emit every constraint category
    ///
    /// With `invert_bug_condition` the assertion thread's last path condition
    /// is negated, which asks for a run in which the assertion fails.
    pub fn build(mut self, invert_bug_condition: bool) -> ConstraintModel {
        let total_ops = self.model.total_ops();
        debug!(total_ops, threads = self.model.ops_by_thread.len(), "Generating constraint model");

        self.memory_order(total_ops);
        self.read_write();
        self.path(invert_bug_condition);
        self.locking();
        self.fork_start();
        self.join_exit();
        self.wait_signal();
        self.barrier();

        info!("Constraint statistics:\n{}", self.stats);
        ConstraintModel {
            formula: self.formula,
            stats: self.stats,
            total_ops,
        }
    }

    fn memory_order(&mut self, total_ops: usize) {
        self.formula.section("MEMORY-ORDER");
        let max = total_ops.saturating_sub(1) as i64;
        let mut all = Vec::with_capacity(total_ops);
        let mut label = 0;

        for ops in self.model.ops_by_thread.values() {
            let names: Vec<String> = ops
                .iter()
                .map(|op| op.order_name().as_str().to_string())
                .collect();
            for name in &names {
                self.formula.declare_bounded(name, 0, max);
            }
            if names.len() > 1 {
                self.formula
                    .assert_named(&smtlib::chain_lt(&names), &format!("MO{label}"));
                label += 1;
            }
            self.stats.memory_order += names.len();
            all.extend(names);
        }

        if all.len() > 1 {
            self.formula.assert(&smtlib::distinct(&all));
        }
        self.stats.unknown_vars += self.stats.memory_order;
    }

    /// Writes a read may observe: all writes of other threads plus the closest
    /// earlier write of its own thread
    fn candidate_writes(&self, read: &Operation) -> Vec<&'a Operation> {
        let Some(writes) = self.model.writes.get(&read.var) else {
            return Vec::new();
        };
        let mut closest: Option<&Operation> = None;
        for op in self.model.thread_ops(&read.thread) {
            if op == read {
                break;
            }
            if op.is_write() && op.var == read.var {
                closest = Some(op);
            }
        }
        writes
            .iter()
            .filter(|w| w.thread != read.thread || closest == Some(*w))
            .collect()
    }

    fn read_write(&mut self) {
        self.formula.section("READ-WRITE");

        for read in self.model.reads.values().flatten() {
            self.stats.unknown_vars += 1;
            self.formula.declare_int(&read.value_name());
        }

        let mut declared_init = BTreeSet::new();
        let mut label = 0;
        for read in self.model.reads.values().flatten() {
            let read_value = read.value_name();
            let read_order = read.order_name();
            let read_order = read_order.as_str();
            let writes = self.candidate_writes(read);
            if writes.is_empty() {
                self.stats.read_write += 1;
            }

            let mut init_conj = Vec::with_capacity(writes.len() + 1);
            let mut disjuncts = Vec::with_capacity(writes.len() + 1);
            for (i, write) in writes.iter().enumerate() {
                let value = match &write.kind {
                    OpKind::Write { value } => self.translator.translate(value),
                    _ => continue,
                };
                let write_order = write.order_name();
                let write_order = write_order.as_str();

                let mut conj = vec![
                    smtlib::eq(&read_value, &value),
                    smtlib::lt(write_order, read_order),
                ];
                self.stats.read_write += 1;
                for (j, other) in writes.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    let other_order = other.order_name();
                    let other_order = other_order.as_str();
                    conj.push(smtlib::or(&[
                        smtlib::lt(other_order, write_order),
                        smtlib::lt(read_order, other_order),
                    ]));
                    self.stats.read_write += 2;
                }
                disjuncts.push(smtlib::and(&conj));

                init_conj.push(smtlib::lt(read_order, write_order));
                self.stats.read_write += 1;
            }

            let Some(init) = read.initial_value_name() else {
                continue;
            };
            if declared_init.insert(init.clone()) {
                self.formula.declare_int(&init);
            }
            init_conj.insert(0, smtlib::eq(&read_value, &init));
            disjuncts.insert(0, smtlib::and(&init_conj));

            self.formula
                .assert_named(&smtlib::or(&disjuncts), &format!("RWC{label}"));
            label += 1;
        }
    }

    fn path(&mut self, invert_bug_condition: bool) {
        self.formula.section("PATH");
        let conditions = &self.model.path_conditions;
        let assert_thread = self.model.assert_thread.as_ref();
        let mut counter = 0;
        let mut last_thread = conditions.first().map(|pc| &pc.thread);

        for (i, pc) in conditions.iter().enumerate() {
            let OpKind::PathCondition { expr } = &pc.kind else {
                continue;
            };
            self.stats.path += 1;
            if last_thread != Some(&pc.thread) {
                counter = 0;
                last_thread = Some(&pc.thread);
            }

            let mut label = format!("PC{counter}_T{}", pc.thread);
            counter += 1;
            let is_bug_condition = assert_thread == Some(&pc.thread)
                && conditions
                    .get(i + 1)
                    .map_or(true, |next| next.thread != pc.thread);
            if is_bug_condition {
                label.push_str("_BUGCOND");
            }

            let mut expr = self.translator.translate(expr);
            if invert_bug_condition && is_bug_condition {
                info!(label = %label, "Inverting assertion condition to force failure");
                expr = smtlib::invert(&expr);
            }
            self.formula.assert_named(&expr, &label);
        }
    }

    fn locking(&mut self) {
        self.formula.section("LOCKING");
        let mut label = 0;

        for pairs in self.model.lock_pairs.values() {
            if pairs.len() < 2 {
                continue;
            }
            self.stats.locking += 1;

            for (i, main) in pairs.iter().enumerate() {
                let others = prune_lock_pairs(pairs, i);
                if others.is_empty() {
                    continue;
                }
                self.stats.locking += 1 + 2 * others.len();

                let main_lock = main.lock_name();
                let main_unlock = main.unlock_name();
                let main_unlock = main_unlock.as_ref().map(|name| name.as_str());

                let mut main_first = Vec::new();
                let mut other_first = Vec::new();
                for (j, prime) in others.iter().enumerate() {
                    let prime_lock = prime.lock_name();
                    let mut conj = Vec::new();
                    if let Some(prime_unlock) = prime.unlock_name() {
                        conj.push(smtlib::gt(main_lock.as_str(), prime_unlock.as_str()));
                    }
                    for (u, third) in others.iter().enumerate() {
                        if u == j {
                            continue;
                        }
                        let third_lock = third.lock_name();
                        let third_unlock = third.unlock_name();
                        let after_main = main_unlock
                            .map(|unlock| smtlib::gt(third_lock.as_str(), unlock));
                        let before_prime = third_unlock
                            .as_ref()
                            .map(|unlock| smtlib::lt(unlock.as_str(), prime_lock.as_str()));
                        match (after_main, before_prime) {
                            (Some(a), Some(b)) => conj.push(smtlib::or(&[a, b])),
                            (Some(a), None) => conj.push(a),
                            (None, Some(b)) => conj.push(b),
                            (None, None) => {}
                        }
                    }
                    if let Some(unlock) = main_unlock {
                        main_first.push(smtlib::lt(unlock, prime_lock.as_str()));
                    }
                    other_first.push(smtlib::and(&conj));
                }

                let mut disjuncts = vec![smtlib::and(&main_first)];
                disjuncts.extend(other_first);
                self.formula
                    .assert_named(&smtlib::or(&disjuncts), &format!("LC{label}"));
                label += 1;
            }
        }
    }

    fn fork_start(&mut self) {
        self.formula.section("FORK-START");
        let mut label = 0;
        for fork in self.model.forks.values().flatten() {
            let OpKind::Fork { child } = &fork.kind else {
                continue;
            };
            let Some(start) = self.model.starts.get(child) else {
                debug!(child = %child, "No start event for forked thread; skipping");
                continue;
            };
            self.formula.assert_named(
                &smtlib::lt(fork.order_name().as_str(), start.order_name().as_str()),
                &format!("FSC{label}"),
            );
            label += 1;
            self.stats.partial_order += 1;
        }
    }

    fn join_exit(&mut self) {
        self.formula.section("JOIN-EXIT");
        let mut label = 0;
        for join in self.model.joins.values().flatten() {
            let OpKind::Join { child } = &join.kind else {
                continue;
            };
            let Some(exit) = self.model.exits.get(child) else {
                debug!(child = %child, "No exit event for joined thread; skipping");
                continue;
            };
            self.formula.assert_named(
                &smtlib::gt(join.order_name().as_str(), exit.order_name().as_str()),
                &format!("JEC{label}"),
            );
            label += 1;
            self.stats.partial_order += 1;
        }
    }

    fn wait_signal(&mut self) {
        self.formula.section("WAIT-SIGNAL");
        let mut label = 0;
        // signal value name -> (signal-all, indicators)
        let mut indicators: BTreeMap<String, (bool, Vec<String>)> = BTreeMap::new();
        let no_signals = Vec::new();

        for (object, waits) in &self.model.waits {
            let signals = self.model.signals.get(object).unwrap_or(&no_signals);
            for wait in waits {
                let wait_order = wait.order_name();
                let mut disjuncts = Vec::with_capacity(signals.len());
                for signal in signals {
                    let all = matches!(signal.kind, OpKind::Signal { all: true });
                    let indicator = signal_indicator(wait, signal, all);
                    self.formula.declare_bounded(&indicator, 0, 1);
                    disjuncts.push(smtlib::and(&[
                        smtlib::lt(signal.order_name().as_str(), wait_order.as_str()),
                        smtlib::eq(&indicator, "1"),
                    ]));
                    self.stats.partial_order += 2;
                    indicators
                        .entry(signal.value_name())
                        .or_insert_with(|| (all, Vec::new()))
                        .1
                        .push(indicator);
                }
                self.formula
                    .assert_named(&smtlib::or(&disjuncts), &format!("WSC{label}"));
                label += 1;
            }
        }

        for (all, vars) in indicators.values() {
            let total = smtlib::sum(vars);
            if *all {
                self.formula.assert(&smtlib::ge(&total, "0"));
            } else {
                self.formula.assert(&smtlib::le(&total, "1"));
            }
            self.stats.partial_order += 1;
        }
    }

    fn barrier(&mut self) {
        self.formula.section("BARRIER");
        let model = self.model;
        let mut label = 0;
        for arrivals in model.barriers.values() {
            let next_ops: Vec<&Operation> = arrivals
                .iter()
                .filter_map(|arrival| {
                    let ops = model.thread_ops(&arrival.thread);
                    let pos = ops.iter().position(|op| op == arrival)?;
                    ops.get(pos + 1)
                })
                .collect();
            for arrival in arrivals {
                let arrival_order = arrival.order_name();
                for next in &next_ops {
                    self.formula.assert_named(
                        &smtlib::lt(arrival_order.as_str(), next.order_name().as_str()),
                        &format!("BC{label}"),
                    );
                    label += 1;
                }
            }
        }
    }
}

/// Generate the formula for `model`
pub fn build_constraint_model(model: &TraceModel, invert_bug_condition: bool) -> ConstraintModel {
    ConstraintModelGenerator::new(model).build(invert_bug_condition)
}

/// Pairs that `pairs[main]` must be ordered against
///
/// Pairs of the main pair's own thread are already ordered by program order,
/// so only the one closest before it is kept.
fn prune_lock_pairs(pairs: &[LockPair], main: usize) -> Vec<&LockPair> {
    let main_pair = &pairs[main];
    let mut others: Vec<&LockPair> = pairs
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != main)
        .map(|(_, pair)| pair)
        .collect();

    if main == 0 {
        let same_thread = others
            .iter()
            .take_while(|pair| pair.thread == main_pair.thread)
            .count();
        others.drain(..same_thread);
        return others;
    }

    let closest = others[main - 1];
    let mut kept = Vec::with_capacity(others.len());
    let mut in_block = false;
    for (pos, pair) in others.iter().enumerate() {
        if pair.thread == main_pair.thread {
            in_block = true;
            if *pair == closest {
                kept.push(*pair);
            }
        } else if in_block {
            kept.extend_from_slice(&others[pos..]);
            break;
        } else {
            kept.push(*pair);
        }
    }
    kept
}

fn signal_indicator(wait: &Operation, signal: &Operation, all: bool) -> String {
    format!(
        "b{}@W{}-{}-{}@{}{}-{}-{}",
        wait.var,
        wait.loc.line,
        wait.thread,
        wait.instance,
        if all { "SALL" } else { "S" },
        signal.loc.line,
        signal.thread,
        signal.instance
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use schedsmith_trace::{parse_trace, ThreadId};

    fn model_of(traces: &[(&str, &str)]) -> TraceModel {
        let mut model = TraceModel::new();
        for (tid, text) in traces {
            parse_trace(&mut model, &ThreadId::from(*tid), &format!("T{tid}"), text).unwrap();
        }
        model
    }

    fn lines_with(model: &ConstraintModel, needle: &str) -> Vec<String> {
        model
            .formula
            .lines()
            .iter()
            .filter(|line| line.contains(needle))
            .cloned()
            .collect()
    }

    #[test]
    fn test_memory_order_declares_every_operation() {
        let model = model_of(&[("1", "a.c@1:R-x-1-0\na.c@2:R-y-1-0\n"), ("2", "a.c@5:R-x-2-0\n")]);
        let built = build_constraint_model(&model, false);
        assert_eq!(built.total_ops, 5);
        assert!(built
            .formula
            .lines()
            .contains(&"(assert (<= OR-x-1-0&a.c@1 4))".to_string()));
        assert_eq!(
            lines_with(&built, ":named MO0"),
            vec!["(assert (! (< OR-x-1-0&a.c@1 OR-y-1-0&a.c@2 OS-exit-1&a.c@3) :named MO0))"]
        );
        let distinct = lines_with(&built, "(distinct");
        assert_eq!(distinct.len(), 1);
        assert_eq!(built.stats.memory_order, 5);
    }

    #[test]
    fn test_single_operation_has_no_distinct() {
        let mut model = TraceModel::new();
        model.ops_by_thread.insert(
            ThreadId::from("1"),
            vec![Operation::new(
                ThreadId::from("1"),
                "",
                0,
                schedsmith_trace::SourceLoc::new("a.c", 1),
                OpKind::ThreadExit,
            )],
        );
        let built = build_constraint_model(&model, false);
        assert!(lines_with(&built, "distinct").is_empty());
        assert!(lines_with(&built, ":named MO").is_empty());
        assert!(built
            .formula
            .lines()
            .contains(&"(assert (<= OS-exit-1&a.c@1 0))".to_string()));
    }

    #[test]
    fn test_read_write_disjunction() {
        let model = model_of(&[("1", "a.c@3:W-x-1\n$5$\n"), ("2", "b.c@7:R-x-2-0\n")]);
        let built = build_constraint_model(&model, false);
        let rwc = lines_with(&built, ":named RWC0");
        assert_eq!(rwc.len(), 1);
        assert_eq!(
            rwc[0],
            "(assert (! (or (and (= R-x-2-0 InitR-x-2) (< OR-x-2-0&b.c@7 OW-x-1-0&a.c@3)) \
             (and (= R-x-2-0 5) (< OW-x-1-0&a.c@3 OR-x-2-0&b.c@7))) :named RWC0))"
        );
        assert!(built
            .formula
            .lines()
            .contains(&"(declare-const InitR-x-2 Int)".to_string()));
    }

    #[test]
    fn test_read_without_writes_uses_initial_value() {
        let model = model_of(&[("1", "a.c@3:R-x-1-0\na.c@4:R-x-1-1\n")]);
        let built = build_constraint_model(&model, false);
        assert_eq!(
            lines_with(&built, ":named RWC0"),
            vec!["(assert (! (= R-x-1-0 InitR-x-1) :named RWC0))"]
        );
        // one initial value per (variable, thread)
        assert_eq!(lines_with(&built, "(declare-const InitR-x-1 Int)").len(), 1);
    }

    #[test]
    fn test_shadowed_same_thread_writes_are_pruned() {
        let model = model_of(&[(
            "1",
            "a.c@1:W-x-1\n$1$\na.c@2:W-x-1\n$2$\na.c@3:R-x-1-0\na.c@4:W-x-1\n$3$\n",
        )]);
        let built = build_constraint_model(&model, false);
        let rwc = &lines_with(&built, ":named RWC0")[0];
        assert!(rwc.contains("(= R-x-1-0 2)"));
        assert!(!rwc.contains("(= R-x-1-0 1)"));
        assert!(!rwc.contains("(= R-x-1-0 3)"));
    }

    #[test]
    fn test_written_values_are_translated() {
        let model = model_of(&[
            ("1", "a.c@1:R-y-1-0\na.c@2:W-x-1\n$(Add w32 1 (ReadLSB w32 0 y-1-0))$\n"),
            ("2", "a.c@9:R-x-2-0\n"),
        ]);
        let built = build_constraint_model(&model, false);
        assert!(lines_with(&built, "RWC")
            .iter()
            .any(|line| line.contains("(= R-x-2-0 (+ 1 R-y-1-0))")));
    }

    #[test]
    fn test_bug_condition_label_and_inversion() {
        let traces = [
            (
                "1",
                "<assertThread_ok>\na.c@3:R-x-1-0\nT1:(Ult 0 1)\nT1:(Eq 0 (ReadLSB w32 0 x-1-0))\n",
            ),
            ("2", "b.c@1:R-x-2-0\nT2:(Eq 1 1)\n"),
        ];
        let model = model_of(&traces);
        let plain = build_constraint_model(&model, false);
        assert_eq!(
            lines_with(&plain, "PC1_T1"),
            vec!["(assert (! (= 0 R-x-1-0) :named PC1_T1_BUGCOND))"]
        );
        assert_eq!(lines_with(&plain, "PC0_T1").len(), 1);
        assert_eq!(lines_with(&plain, "PC0_T2").len(), 1);
        assert_eq!(plain.stats.path, 3);

        let inverted = build_constraint_model(&model, true);
        assert_eq!(
            lines_with(&inverted, "BUGCOND"),
            vec!["(assert (! (= false (= 0 R-x-1-0)) :named PC1_T1_BUGCOND))"]
        );
    }

    #[test]
    fn test_two_critical_sections_exclude_each_other() {
        let model = model_of(&[
            ("1", "a.c@1:S-lock_m-1\na.c@2:S-unlock_m-1\n"),
            ("2", "b.c@1:S-lock_m-2\nb.c@2:S-unlock_m-2\n"),
        ]);
        let built = build_constraint_model(&model, false);
        let lc = lines_with(&built, ":named LC");
        assert_eq!(lc.len(), 2);
        assert_eq!(
            lc[0],
            "(assert (! (or (< OS-unlock_m-1-0&a.c@2 OS-lock_m-2-0&b.c@1) \
             (> OS-lock_m-1-0&a.c@1 OS-unlock_m-2-0&b.c@2)) :named LC0))"
        );
    }

    #[test]
    fn test_lock_pruning_keeps_closest_same_thread_pair() {
        let model = model_of(&[
            (
                "1",
                "a.c@1:S-lock_m-1\na.c@2:S-unlock_m-1\na.c@3:S-lock_m-1\na.c@4:S-unlock_m-1\n\
                 a.c@5:S-lock_m-1\na.c@6:S-unlock_m-1\n",
            ),
            ("2", "b.c@1:S-lock_m-2\nb.c@2:S-unlock_m-2\n"),
        ]);
        let pairs = &model.lock_pairs["m"];
        assert_eq!(pairs.len(), 4);

        let first = prune_lock_pairs(pairs, 0);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].thread.as_str(), "2");

        let third = prune_lock_pairs(pairs, 2);
        assert_eq!(third.len(), 2);
        assert_eq!(third[0].instance, 1);
        assert_eq!(third[1].thread.as_str(), "2");

        let last = prune_lock_pairs(pairs, 3);
        assert_eq!(last.len(), 3);
    }

    #[test]
    fn test_fork_join_constraints_skip_missing_children() {
        let model = model_of(&[
            (
                "0",
                "m.c@1:S-start-0\nm.c@2:S-fork_1-0\nm.c@3:S-fork_2-0\nm.c@4:S-join_1-0\nm.c@5:S-join_2-0\n",
            ),
            ("1", "t.c@1:S-start-1\nt.c@2:R-x-1-0\n"),
        ]);
        let built = build_constraint_model(&model, false);
        assert_eq!(
            lines_with(&built, ":named FSC"),
            vec!["(assert (! (< OS-fork_1-0-0&m.c@2 OS-start-1&t.c@1) :named FSC0))"]
        );
        assert_eq!(
            lines_with(&built, ":named JEC"),
            vec!["(assert (! (> OS-join_1-0-0&m.c@4 OS-exit-1&t.c@3) :named JEC0))"]
        );
        assert_eq!(built.stats.partial_order, 2);
    }

    #[test]
    fn test_wait_signal_indicators() {
        let model = model_of(&[
            ("1", "a.c@4:S-wait_cv-1\n"),
            ("2", "b.c@8:S-signal_cv-2\n"),
            ("3", "c.c@9:S-signalall_cv-3\n"),
        ]);
        let built = build_constraint_model(&model, false);
        let wsc = lines_with(&built, ":named WSC0");
        assert_eq!(wsc.len(), 1);
        assert!(wsc[0].contains("(= bcv@W4-1-0@S8-2-0 1)"));
        assert!(wsc[0].contains("(= bcv@W4-1-0@SALL9-3-0 1)"));
        assert!(built
            .formula
            .lines()
            .contains(&"(assert (<= bcv@W4-1-0@S8-2-0 1))".to_string()));
        assert!(built
            .formula
            .lines()
            .contains(&"(assert (>= bcv@W4-1-0@SALL9-3-0 0))".to_string()));
    }

    #[test]
    fn test_barrier_orders_next_operations() {
        let model = model_of(&[
            ("1", "a.c@1:S-barrier_b-1\na.c@2:R-x-1-0\n"),
            ("2", "b.c@1:S-barrier_b-2\nb.c@2:R-x-2-0\n"),
        ]);
        let built = build_constraint_model(&model, false);
        let bc = lines_with(&built, ":named BC");
        assert_eq!(bc.len(), 4);
        assert!(bc[1].contains("(< OS-barrier_b-1-0&a.c@1 OR-x-2-0&b.c@2)"));
    }

    #[test]
    fn test_stats_table() {
        let stats = ConstraintStats {
            memory_order: 3,
            read_write: 1,
            unknown_vars: 4,
            ..Default::default()
        };
        let table = stats.to_string();
        assert!(table.contains("Memory"));
        assert!(table.contains("75.0%"));
        assert!(table.contains("#CONSTRAINTS: 4"));
        assert!(table.contains("#UNKNOWN VARS: 4"));
    }
}
