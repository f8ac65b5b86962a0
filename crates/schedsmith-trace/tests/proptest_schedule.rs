//! Property-based tests for schedule manipulation and name decoding

use proptest::prelude::*;
use schedsmith_trace::{
    ExpressionTranslator, JpfTranslator, KQueryTranslator, OpKind, Operation, OrderName,
    Schedule, SourceLoc, ThreadId,
};

fn schedule_from_threads(threads: &[u8]) -> Schedule {
    threads
        .iter()
        .enumerate()
        .map(|(i, tid)| {
            Operation::new(
                ThreadId::new(tid.to_string()),
                "x",
                i as u32,
                SourceLoc::new("p.c", i as i64),
                OpKind::Read,
            )
            .order_name()
        })
        .collect()
}

fn sorted_names(schedule: &Schedule) -> Vec<String> {
    let mut names = schedule.to_strings();
    names.sort();
    names
}

proptest! {
    /// Moving a TEI permutes the schedule and keeps each thread's own order
    #[test]
    fn move_tei_is_a_permutation(threads in proptest::collection::vec(0u8..3, 2..24)) {
        let schedule = schedule_from_threads(&threads);
        for pos in 0..schedule.len() {
            if !schedule.is_last_of_tei(pos) {
                continue;
            }
            if let Some(next) = schedule.next_in_thread(pos) {
                let moved = schedule.move_tei(pos, next);
                prop_assert_eq!(moved.len(), schedule.len());
                prop_assert_eq!(sorted_names(&moved), sorted_names(&schedule));
                for tid in 0u8..3 {
                    let tid = ThreadId::new(tid.to_string());
                    let before: Vec<&OrderName> = schedule.iter().filter(|op| op.thread() == &tid).collect();
                    let after: Vec<&OrderName> = moved.iter().filter(|op| op.thread() == &tid).collect();
                    prop_assert_eq!(before, after);
                }
            }
        }
    }

    /// Reversal never changes the number of context switches
    #[test]
    fn reversal_keeps_context_switches(threads in proptest::collection::vec(0u8..4, 0..32)) {
        let schedule = schedule_from_threads(&threads);
        prop_assert_eq!(schedule.reversed().context_switches(), schedule.context_switches());
        prop_assert!(schedule.context_switches() < schedule.len().max(1));
    }

    /// Translators are total over arbitrary text
    #[test]
    fn translators_never_panic(expr in "[()a-zA-Z0-9 +*/%=<>!_-]{0,40}") {
        let _ = KQueryTranslator.translate(&expr);
        let _ = JpfTranslator.translate(&expr);
    }
}
