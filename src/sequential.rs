use crate::{
    CommuteError,
    queue::Pending,
    traits::{Commuter, OperandQueue},
};
use tracing::{debug, warn};

/// Single-threaded drain operations, available on every [`Commuter`].
///
/// All of these run `cop` on the calling thread. They are safe to call while
/// other threads push to the same queue; operands pushed mid-call may or may
/// not be picked up, as documented per method.
pub trait SequentialDrain: Commuter {
    /// Queue an operand for later application. Never runs `cop`.
    fn aggregate_op(&self, operand: Self::Operand) {
        self.queue().push(operand);
    }

    /// Pop the oldest operand and apply `cop` to it.
    ///
    /// # Returns
    /// `Ok(())` once the operand is applied, `CommuteError::EmptyQueue` if
    /// there was nothing to pop, or the error `cop` returned. A failing
    /// operand is consumed.
    fn dequeue(&self) -> Result<(), CommuteError> {
        let operand = self.queue().pop()?;
        self.cop(operand)
    }

    /// Apply `cop` to the whole backlog, oldest first.
    ///
    /// The backlog is detached once, up front, so operands pushed while the
    /// collapse runs wait for the next pass. If `cop` fails or panics, the
    /// operands after the failing one are restored to the head of the queue.
    ///
    /// # Returns
    /// The number of operands applied
    fn collapse_queue(&self) -> Result<usize, CommuteError> {
        let batch = self.queue().empty_queue();
        let total = batch.len();
        let mut pending = Pending::new(batch, |rest| self.queue().restore_front(rest));
        let mut applied = 0;

        while let Some(operand) = pending.next() {
            if let Err(err) = self.cop(operand) {
                warn!(
                    applied,
                    restored = pending.remaining(),
                    error = %err,
                    "collapse stopped on failed operation"
                );
                return Err(err);
            }
            applied += 1;
        }

        debug!(operands = total, "collapsed queue");
        Ok(applied)
    }

    /// Dequeue until at most `desired_len` operands remain.
    ///
    /// A no-op if the queue is already at or below `desired_len`. Concurrent
    /// consumers may shrink the queue as well; the cut stops as soon as the
    /// target is met, whoever met it.
    ///
    /// # Returns
    /// The number of operands this call applied
    fn cut_queue(&self, desired_len: usize) -> Result<usize, CommuteError> {
        let mut applied = 0;
        while self.queue().len() > desired_len {
            match self.dequeue() {
                Ok(()) => applied += 1,
                // drained by someone else between the length check and the pop
                Err(CommuteError::EmptyQueue) => break,
                Err(err) => return Err(err),
            }
        }
        if applied > 0 {
            debug!(applied, desired_len, "cut queue");
        }
        Ok(applied)
    }
}

impl<C> SequentialDrain for C where C: Commuter + ?Sized {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FnCommuter;
    use parking_lot::Mutex;
    use std::{
        panic,
        sync::atomic::{AtomicI64, AtomicUsize, Ordering},
    };

    #[test]
    fn collapse_sums_operands() {
        let total = AtomicI64::new(0);
        let c = FnCommuter::new(|x: i64| {
            total.fetch_add(x, Ordering::SeqCst);
            Ok(())
        });

        for x in [3, 4, 5] {
            c.aggregate_op(x);
        }
        assert_eq!(total.load(Ordering::SeqCst), 0, "aggregate_op must not apply");

        assert_eq!(c.collapse_queue().unwrap(), 3);
        assert_eq!(total.load(Ordering::SeqCst), 12);
        assert_eq!(c.queue().len(), 0);
    }

    #[test]
    fn collapse_preserves_fifo_order() {
        let order = Mutex::new(Vec::new());
        let c = FnCommuter::new(|x: u32| {
            order.lock().push(x);
            Ok(())
        });
        for x in 0..6 {
            c.aggregate_op(x);
        }
        c.collapse_queue().unwrap();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn collapse_on_empty_queue() {
        let c = FnCommuter::new(|_x: u32| Ok(()));
        assert_eq!(c.collapse_queue().unwrap(), 0);
    }

    #[test]
    fn collapse_restores_unapplied_tail() {
        let applied = Mutex::new(Vec::new());
        let c = FnCommuter::new(|x: u32| {
            if x == 3 {
                return Err(CommuteError::operation("bad operand"));
            }
            applied.lock().push(x);
            Ok(())
        });
        for x in 1..=5 {
            c.aggregate_op(x);
        }

        let err = c.collapse_queue().unwrap_err();
        assert!(matches!(err, CommuteError::Operation(_)));
        assert_eq!(*applied.lock(), vec![1, 2]);
        // the failing operand is consumed, the rest wait at the head
        assert_eq!(c.queue().empty_queue(), vec![4, 5]);
    }

    #[test]
    fn collapse_restores_tail_after_panic() {
        let c = FnCommuter::new(|x: u32| {
            assert!(x != 2, "operand 2 is cursed");
            Ok(())
        });
        for x in 1..=4 {
            c.aggregate_op(x);
        }

        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| c.collapse_queue()));
        assert!(result.is_err());
        assert_eq!(c.queue().empty_queue(), vec![3, 4]);
    }

    #[test]
    fn dequeue_on_empty_leaves_state() {
        let calls = AtomicUsize::new(0);
        let c = FnCommuter::new(|_x: u32| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(matches!(c.dequeue(), Err(CommuteError::EmptyQueue)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        c.aggregate_op(9);
        c.dequeue().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cut_queue_stops_at_target() {
        let order = Mutex::new(Vec::new());
        let c = FnCommuter::new(|x: u32| {
            order.lock().push(x);
            Ok(())
        });
        for x in 0..10 {
            c.aggregate_op(x);
        }

        assert_eq!(c.cut_queue(4).unwrap(), 6);
        assert_eq!(c.queue().len(), 4);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4, 5]);

        // already at or below target
        assert_eq!(c.cut_queue(4).unwrap(), 0);
        assert_eq!(c.cut_queue(100).unwrap(), 0);
        assert_eq!(c.queue().len(), 4);

        assert_eq!(c.cut_queue(0).unwrap(), 4);
        assert!(c.queue().is_empty());
    }

    #[test]
    fn cut_queue_propagates_errors() {
        let c = FnCommuter::new(|x: u32| {
            if x == 1 {
                Err(CommuteError::operation("nope"))
            } else {
                Ok(())
            }
        });
        for x in 0..4 {
            c.aggregate_op(x);
        }
        assert!(matches!(c.cut_queue(0), Err(CommuteError::Operation(_))));
        // 0 applied, 1 consumed by the failure
        assert_eq!(c.queue().len(), 2);
    }
}
