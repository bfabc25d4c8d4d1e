//! Property-based tests for the drain and compression laws

use commuter::{
    CommuteError, Commuter, CommuterWithCommutator, ConcurrentDrain, DrainConfig, FnCommuter,
    OperandQueue, RemainderPolicy, SequentialDrain, partition::partition,
};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::{
    Arc,
    atomic::{AtomicI64, AtomicUsize, Ordering},
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A commuter that logs every operand it applies, in the order it applied them
fn recorder() -> (
    FnCommuter<u32, impl Fn(u32) -> Result<(), CommuteError> + Send + Sync>,
    Arc<Mutex<Vec<u32>>>,
) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let applied = log.clone();
    let commuter = FnCommuter::new(move |x: u32| {
        applied.lock().push(x);
        Ok(())
    });
    (commuter, log)
}

fn remainder_policy() -> impl Strategy<Value = RemainderPolicy> {
    prop_oneof![Just(RemainderPolicy::LastWorker), Just(RemainderPolicy::Spread)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// "subtract by" commutes for any pair of operands
    #[test]
    fn subtract_by_commutes(start in -1_000i64..1_000, a in -1_000i64..1_000, b in -1_000i64..1_000) {
        let apply = |first: i64, second: i64| {
            let value = AtomicI64::new(start);
            let c = FnCommuter::new(|x: i64| {
                value.fetch_sub(x, Ordering::SeqCst);
                Ok(())
            });
            c.cop(first).unwrap();
            c.cop(second).unwrap();
            drop(c);
            value.into_inner()
        };
        prop_assert_eq!(apply(a, b), apply(b, a));
    }

    /// Compressing a pair and applying the merge equals applying both
    #[test]
    fn commutator_equivalence(start in -1_000i64..1_000, a in -1_000i64..1_000, b in -1_000i64..1_000) {
        let subtract = |value: &Arc<AtomicI64>| {
            let value = value.clone();
            FnCommuter::new(move |x: i64| {
                value.fetch_sub(x, Ordering::SeqCst);
                Ok(())
            })
        };

        let merged_value = Arc::new(AtomicI64::new(start));
        let merged = CommuterWithCommutator::new(
            subtract(&merged_value),
            |x: &i64, y: &i64| -> Result<i64, CommuteError> { Ok(x + y) },
        );
        merged.commuter().aggregate_op(a);
        merged.commuter().aggregate_op(b);
        merged.compress_queue(1).unwrap();
        prop_assert_eq!(merged.commuter().queue().len(), 1);
        prop_assert_eq!(merged.commuter().collapse_queue().unwrap(), 1);

        let direct_value = Arc::new(AtomicI64::new(start));
        let direct = subtract(&direct_value);
        direct.aggregate_op(a);
        direct.aggregate_op(b);
        prop_assert_eq!(direct.collapse_queue().unwrap(), 2);

        prop_assert_eq!(
            merged_value.load(Ordering::SeqCst),
            direct_value.load(Ordering::SeqCst)
        );
    }

    /// Every operand present at call time is applied exactly once
    #[test]
    fn collapse_applies_everything_once(operands in prop::collection::vec(any::<u32>(), 0..200)) {
        let calls = AtomicUsize::new(0);
        let c = FnCommuter::new(|_x: u32| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        for &x in &operands {
            c.aggregate_op(x);
        }
        prop_assert_eq!(c.collapse_queue().unwrap(), operands.len());
        prop_assert_eq!(calls.load(Ordering::SeqCst), operands.len());
        prop_assert!(c.queue().is_empty());
    }

    /// Cutting leaves at most the target, and is a no-op at or below it
    #[test]
    fn cut_length_law(len in 0usize..100, desired in 0usize..120) {
        let (c, log) = recorder();
        for x in 0..len {
            c.aggregate_op(u32::try_from(x).unwrap());
        }
        let applied = c.cut_queue(desired).unwrap();
        prop_assert_eq!(c.queue().len(), len.min(desired));
        prop_assert_eq!(applied, len.saturating_sub(desired));
        // the oldest operands go first
        let expected: Vec<u32> = (0..u32::try_from(applied).unwrap()).collect();
        prop_assert_eq!(&*log.lock(), &expected);
    }

    /// No operand is lost to remainder truncation or applied twice
    #[test]
    fn partition_completeness(
        len in 0usize..300,
        workers in 1usize..12,
        policy in remainder_policy(),
    ) {
        init_tracing();
        let seen = Mutex::new(vec![0u8; len]);
        let c = FnCommuter::new(|x: usize| {
            seen.lock()[x] += 1;
            Ok(())
        });
        for x in 0..len {
            c.aggregate_op(x);
        }

        let report = c
            .par_collapse_queue_with(&DrainConfig::new(workers).remainder(policy))
            .unwrap();
        prop_assert_eq!(report.applied, len);
        prop_assert_eq!(report.per_worker.len(), workers.min(len));
        drop(c);
        prop_assert!(seen.into_inner().iter().all(|&n| n == 1));
    }

    /// Slice sizes never differ by more than the remainder
    #[test]
    fn partition_sizes(len in 0usize..500, workers in 1usize..16, policy in remainder_policy()) {
        let ranges = partition(len, workers, policy);
        let base = len / workers;
        let total: usize = ranges.iter().map(ExactSizeIterator::len).sum();
        prop_assert_eq!(total, len);
        prop_assert!(ranges.iter().all(|r| r.len() >= base && r.len() <= base + len % workers));
    }

    /// The concurrent cut applies exactly len - desired operands
    #[test]
    fn parallel_cut_length_law(len in 0usize..200, desired in 0usize..220, workers in 1usize..8) {
        let (c, log) = recorder();
        for x in 0..len {
            c.aggregate_op(u32::try_from(x).unwrap());
        }
        let report = c.par_cut_queue(desired, workers).unwrap();
        prop_assert_eq!(report.applied, len.saturating_sub(desired));
        prop_assert_eq!(c.queue().len(), len.min(desired));
        // workers interleave, but together they took exactly the oldest operands
        let mut applied = log.lock().clone();
        applied.sort_unstable();
        let expected: Vec<u32> = (0..u32::try_from(report.applied).unwrap()).collect();
        prop_assert_eq!(applied, expected);
    }

    /// Each round removes exactly one operand; merging preserves the total
    #[test]
    fn compressor_shrink_law(operands in prop::collection::vec(-1_000i64..1_000, 0..100), rounds in 0usize..50) {
        let rounds = rounds.min(operands.len() / 2);
        let total = Arc::new(AtomicI64::new(0));
        let sum = total.clone();
        let merged = CommuterWithCommutator::new(
            FnCommuter::new(move |x: i64| {
                sum.fetch_add(x, Ordering::SeqCst);
                Ok(())
            }),
            |a: &i64, b: &i64| -> Result<i64, CommuteError> { Ok(a + b) },
        );
        for &x in &operands {
            merged.commuter().aggregate_op(x);
        }

        merged.compress_queue(rounds).unwrap();
        prop_assert_eq!(merged.commuter().queue().len(), operands.len() - rounds);

        merged.commuter().collapse_queue().unwrap();
        prop_assert_eq!(total.load(Ordering::SeqCst), operands.iter().sum::<i64>());
    }
}
