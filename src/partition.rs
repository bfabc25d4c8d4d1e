use std::ops::Range;

/// How the `len % workers` leftover operands are assigned when a backlog does
/// not split evenly.
///
/// Every slice gets at least `len / workers` operands. The policy only decides
/// where the remainder goes; it never drops it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RemainderPolicy {
    /// The last worker takes the whole remainder.
    ///
    /// Ten operands over three workers gives slices of 3, 3 and 4.
    #[default]
    LastWorker,

    /// The first `len % workers` workers take one extra operand each.
    ///
    /// Ten operands over three workers gives slices of 4, 3 and 3.
    Spread,
}

/// Split `0..len` into `workers` contiguous ranges.
///
/// The ranges are returned in order, cover `0..len` exactly once, and there is
/// always exactly one range per worker. When `workers > len` the surplus
/// workers get empty ranges. `workers` must be non-zero.
///
/// # Examples
///
/// ```
/// use commuter::{RemainderPolicy, partition::partition};
///
/// let sizes: Vec<usize> = partition(10, 3, RemainderPolicy::LastWorker)
///     .into_iter()
///     .map(|r| r.len())
///     .collect();
/// assert_eq!(sizes, vec![3, 3, 4]);
/// ```
pub fn partition(len: usize, workers: usize, policy: RemainderPolicy) -> Vec<Range<usize>> {
    debug_assert!(workers > 0, "partition needs at least one worker");
    let workers = workers.max(1);
    let base = len / workers;
    let remainder = len % workers;

    let mut ranges = Vec::with_capacity(workers);
    let mut start = 0;
    for worker in 0..workers {
        let size = match policy {
            RemainderPolicy::LastWorker if worker + 1 == workers => base + remainder,
            RemainderPolicy::LastWorker => base,
            RemainderPolicy::Spread if worker < remainder => base + 1,
            RemainderPolicy::Spread => base,
        };
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

/// Cut a detached batch into the owned slices described by `ranges`.
///
/// `ranges` must be contiguous and cover the batch, as [`partition`] returns
/// them.
pub(crate) fn split_batch<T>(mut batch: Vec<T>, ranges: &[Range<usize>]) -> Vec<Vec<T>> {
    let mut slices = Vec::with_capacity(ranges.len());
    for range in ranges.iter().rev() {
        slices.push(batch.split_off(range.start));
    }
    slices.reverse();
    slices
}
