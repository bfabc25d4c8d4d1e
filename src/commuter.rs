use crate::{
    CommuteError,
    queue::FifoQueue,
    traits::{Commuter, OperandQueue},
};
use std::fmt;

/// A [`Commuter`] assembled from a [`FifoQueue`] and a closure.
///
/// The closure is the commuting operation. Whatever state it touches lives in
/// its captures, and it is responsible for its own synchronization (atomics,
/// a mutex) if the commuter is drained concurrently.
///
/// # Type Parameters
///
/// * `T` - The operand type
/// * `F` - The closure implementing `cop`
///
/// # Examples
///
/// ```
/// use commuter::{FnCommuter, SequentialDrain};
/// use parking_lot::Mutex;
/// use std::collections::BTreeSet;
///
/// # fn main() -> Result<(), commuter::CommuteError> {
/// let seen = Mutex::new(BTreeSet::new());
/// let union = FnCommuter::with_capacity(8, |word: &'static str| {
///     seen.lock().insert(word);
///     Ok(())
/// });
///
/// union.aggregate_op("b");
/// union.aggregate_op("a");
/// union.aggregate_op("b");
/// union.collapse_queue()?;
///
/// assert_eq!(seen.lock().iter().copied().collect::<Vec<_>>(), vec!["a", "b"]);
/// # Ok(())
/// # }
/// ```
pub struct FnCommuter<T, F>
where
    F: Fn(T) -> Result<(), CommuteError>,
{
    queue: FifoQueue<T>,
    op: F,
}

impl<T, F> fmt::Debug for FnCommuter<T, F>
where
    F: Fn(T) -> Result<(), CommuteError>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCommuter")
            .field("queue_len", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl<T, F> FnCommuter<T, F>
where
    F: Fn(T) -> Result<(), CommuteError>,
{
    /// Create a commuter with an empty queue
    pub fn new(op: F) -> Self {
        Self {
            queue: FifoQueue::new(),
            op,
        }
    }

    /// Create a commuter whose queue has room for `capacity` operands
    pub fn with_capacity(capacity: usize, op: F) -> Self {
        Self {
            queue: FifoQueue::with_capacity(capacity),
            op,
        }
    }

    /// Consume the commuter, returning the operation closure
    pub fn into_op(self) -> F {
        self.op
    }
}

impl<T, F> Commuter for FnCommuter<T, F>
where
    F: Fn(T) -> Result<(), CommuteError>,
{
    type Operand = T;
    type Queue = FifoQueue<T>;

    fn queue(&self) -> &FifoQueue<T> {
        &self.queue
    }

    fn cop(&self, operand: T) -> Result<(), CommuteError> {
        (self.op)(operand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[test]
    fn cop_applies_immediately() {
        let total = AtomicI64::new(0);
        let c = FnCommuter::new(|x: i64| {
            total.fetch_add(x, Ordering::SeqCst);
            Ok(())
        });

        c.cop(7).unwrap();
        assert_eq!(total.load(Ordering::SeqCst), 7);
        assert!(c.queue().is_empty());
    }

    #[test]
    fn cop_order_does_not_matter() {
        // subtract-by commutes even though subtraction does not
        let run = |order: [i64; 2]| {
            let base = AtomicI64::new(100);
            let c = FnCommuter::new(|x: i64| {
                base.fetch_sub(x, Ordering::SeqCst);
                Ok(())
            });
            for x in order {
                c.cop(x).unwrap();
            }
            drop(c);
            base.load(Ordering::SeqCst)
        };
        assert_eq!(run([5, -6]), run([-6, 5]));
        assert_eq!(run([5, -6]), 101);
    }

    #[test]
    fn errors_come_back_unchanged() {
        let c = FnCommuter::new(|x: u8| {
            if x == 0 {
                Err(CommuteError::operation("zero operand"))
            } else {
                Ok(())
            }
        });
        assert!(c.cop(1).is_ok());
        let err = c.cop(0).unwrap_err();
        assert_eq!(err.to_string(), "operation failed: zero operand");
    }

    #[test]
    fn into_op_returns_closure() {
        let c = FnCommuter::new(|_x: u8| Ok(()));
        let op = c.into_op();
        assert!(op(3).is_ok());
    }
}
