use crate::CommuteError;

/// Trait for the backlog a [`Commuter`] drains.
///
/// Every mutating operation must be atomic on its own: the queue is shared by
/// producers, compressors and drain workers at the same time, and none of them
/// hold a lock across calls.
pub trait OperandQueue<T> {
    /// Append an operand to the tail.
    fn push(&self, operand: T);

    /// Remove and return the oldest operand.
    ///
    /// # Returns
    /// The head operand, or `CommuteError::EmptyQueue` if the queue is empty
    fn pop(&self) -> Result<T, CommuteError>;

    /// Remove the two oldest operands in one atomic step.
    ///
    /// # Returns
    /// `(oldest, next)` on success, or `CommuteError::InsufficientOperands`
    /// with nothing removed if fewer than two operands are queued
    fn pop_pair(&self) -> Result<(T, T), CommuteError>;

    /// Detach and return every queued operand in FIFO order, leaving the queue
    /// empty.
    ///
    /// Pushes racing with the detach either land in the returned batch or stay
    /// in the queue; none are lost.
    fn empty_queue(&self) -> Vec<T>;

    /// Put operands back at the head of the queue, ahead of anything pushed
    /// since they were removed. `operands[0]` becomes the new head.
    fn restore_front(&self, operands: Vec<T>);

    /// Current number of queued operands.
    fn len(&self) -> usize;

    /// Check whether the queue is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A data structure with a commuting operation and a queue of pending
/// operands for it.
///
/// # Contract
///
/// For any two operands `a` and `b` drawn from the same queue, applying
/// `cop(a)` then `cop(b)` must leave the same observable state as `cop(b)`
/// then `cop(a)`. This cannot be checked at runtime; the drain engines rely on
/// it to apply slices in parallel without ordering them.
///
/// If `cop` touches shared state it should synchronize internally, for
/// example by taking a lock inside `cop`. The concurrent engine calls `cop`
/// from several threads at once through `&self`.
///
/// # Examples
///
/// ```
/// use commuter::{CommuteError, Commuter, FifoQueue, SequentialDrain};
/// use parking_lot::Mutex;
///
/// struct Product {
///     queue: FifoQueue<f64>,
///     value: Mutex<f64>,
/// }
///
/// impl Commuter for Product {
///     type Operand = f64;
///     type Queue = FifoQueue<f64>;
///
///     fn queue(&self) -> &FifoQueue<f64> {
///         &self.queue
///     }
///
///     fn cop(&self, factor: f64) -> Result<(), CommuteError> {
///         *self.value.lock() *= factor;
///         Ok(())
///     }
/// }
///
/// # fn main() -> Result<(), CommuteError> {
/// let product = Product { queue: FifoQueue::new(), value: Mutex::new(1.0) };
/// product.aggregate_op(5.0);
/// product.aggregate_op(-6.0);
/// product.collapse_queue()?;
/// assert_eq!(*product.value.lock(), -30.0);
/// # Ok(())
/// # }
/// ```
pub trait Commuter {
    /// The operand type consumed by [`Commuter::cop`].
    type Operand;

    /// The queue holding pending operands.
    type Queue: OperandQueue<Self::Operand>;

    /// Access the queue of pending operands.
    fn queue(&self) -> &Self::Queue;

    /// Apply the commuting operation once.
    fn cop(&self, operand: Self::Operand) -> Result<(), CommuteError>;
}

/// A merge rule for the operands of a [`Commuter`].
///
/// `merge(a, b)` must return an operand `c` such that `cop(c)` is equivalent
/// to `cop(a); cop(b)` in either order. Merging must also be associative
/// enough that folding any sequence pairwise down to one operand reproduces
/// the effect of applying every original operand once. This law is a
/// precondition; a violating commutator silently corrupts the result.
///
/// The commutator for an operation that already composes with itself, such as
/// "multiply by", is that same operation. For "subtract by" it is addition:
/// subtracting 5 and then 6 is subtracting 11.
///
/// Any `Fn(&T, &T) -> Result<T, CommuteError>` is a commutator.
pub trait Commutator<T> {
    /// Combine two operands into one equivalent operand.
    fn merge(&self, first: &T, second: &T) -> Result<T, CommuteError>;
}

impl<T, F> Commutator<T> for F
where
    F: Fn(&T, &T) -> Result<T, CommuteError>,
{
    fn merge(&self, first: &T, second: &T) -> Result<T, CommuteError> {
        self(first, second)
    }
}
