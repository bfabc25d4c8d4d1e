use crate::{
    CommuteError,
    traits::{Commutator, Commuter, OperandQueue},
};
use std::fmt;
use tracing::{debug, warn};

/// A [`Commuter`] paired with the [`Commutator`] for its operation.
///
/// The pairing adds one capability: shrinking the queue by merging operands
/// instead of applying them. Each compression round takes the two oldest
/// operands in a single atomic step and pushes their merge to the tail, so
/// rounds interleave safely with producers and with drains running against
/// the same queue.
///
/// The wrapped commuter is still reachable through
/// [`commuter`](CommuterWithCommutator::commuter) for draining.
///
/// # Examples
///
/// ```
/// use commuter::{CommuteError, CommuterWithCommutator, FnCommuter, SequentialDrain};
/// use std::sync::atomic::{AtomicI64, Ordering};
///
/// # fn main() -> Result<(), CommuteError> {
/// // "subtract by" commutes, and its commutator is addition
/// let value = AtomicI64::new(100);
/// let subtract = FnCommuter::new(|x: i64| {
///     value.fetch_sub(x, Ordering::SeqCst);
///     Ok(())
/// });
/// let merged = CommuterWithCommutator::new(subtract, |a: &i64, b: &i64| -> Result<i64, CommuteError> {
///     Ok(a + b)
/// });
///
/// merged.commuter().aggregate_op(5);
/// merged.commuter().aggregate_op(-6);
/// merged.compress_queue(1)?;
/// merged.commuter().collapse_queue()?;
///
/// assert_eq!(value.load(Ordering::SeqCst), 101);
/// # Ok(())
/// # }
/// ```
pub struct CommuterWithCommutator<C, M>
where
    C: Commuter,
    M: Commutator<C::Operand>,
{
    commuter: C,
    commutator: M,
}

impl<C, M> fmt::Debug for CommuterWithCommutator<C, M>
where
    C: Commuter + fmt::Debug,
    M: Commutator<C::Operand>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommuterWithCommutator")
            .field("commuter", &self.commuter)
            .finish_non_exhaustive()
    }
}

impl<C, M> CommuterWithCommutator<C, M>
where
    C: Commuter,
    M: Commutator<C::Operand>,
{
    /// Pair a commuter with the merge rule for its operands
    pub const fn new(commuter: C, commutator: M) -> Self {
        Self {
            commuter,
            commutator,
        }
    }

    /// Access the wrapped commuter
    pub const fn commuter(&self) -> &C {
        &self.commuter
    }

    /// Access the merge rule
    pub const fn commutator(&self) -> &M {
        &self.commutator
    }

    /// Split back into the commuter and its merge rule
    pub fn into_parts(self) -> (C, M) {
        (self.commuter, self.commutator)
    }

    /// Run `num_ops` merge rounds, never calling `cop`.
    ///
    /// Each round pops the two oldest operands `first` and `second` and pushes
    /// `merge(first, second)` to the tail, so the queue shrinks by exactly one
    /// per round. On `[3, 4, 5, 6]` with addition, two rounds leave
    /// `[7, 11]`.
    ///
    /// # Errors
    ///
    /// - `InsufficientOperands` if a round starts with fewer than two
    ///   operands queued; that round removes nothing
    /// - the commutator's error, after putting both operands back at the head
    ///   of the queue in their original order
    ///
    /// Rounds completed before the error stay completed.
    ///
    /// # Returns
    /// The number of rounds run, always `num_ops` on success
    pub fn compress_queue(&self, num_ops: usize) -> Result<usize, CommuteError> {
        let queue = self.commuter.queue();
        for round in 0..num_ops {
            let (first, second) = queue.pop_pair().inspect_err(|err| {
                debug!(round, num_ops, error = %err, "compression stopped");
            })?;
            match self.commutator.merge(&first, &second) {
                Ok(merged) => queue.push(merged),
                Err(err) => {
                    warn!(round, error = %err, "commutator failed, restoring operands");
                    queue.restore_front(vec![first, second]);
                    return Err(err);
                },
            }
        }
        if num_ops > 0 {
            debug!(rounds = num_ops, len = queue.len(), "compressed queue");
        }
        Ok(num_ops)
    }

    /// Merge rounds until at most `desired_len` operands remain.
    ///
    /// A no-op when the queue is already at or below `desired_len`. A target
    /// of zero stops at one operand, the fold of the whole backlog, since a
    /// round cannot merge a single operand away.
    ///
    /// # Returns
    /// The number of rounds run
    pub fn compress_queue_to(&self, desired_len: usize) -> Result<usize, CommuteError> {
        let queue = self.commuter.queue();
        let floor = desired_len.max(1);
        let mut rounds = 0;
        while queue.len() > floor {
            match self.compress_queue(1) {
                Ok(_) => rounds += 1,
                // consumers drained the queue under us
                Err(CommuteError::InsufficientOperands { .. }) => break,
                Err(err) => return Err(err),
            }
        }
        Ok(rounds)
    }
}
