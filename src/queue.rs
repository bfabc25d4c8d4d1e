use crate::{CommuteError, traits::OperandQueue};
use parking_lot::Mutex;
use std::{collections::VecDeque, fmt, mem, vec};

/// Mutex-guarded FIFO queue of operands.
///
/// Each operation takes the lock exactly once, so `push`, `pop`, `pop_pair`
/// and `empty_queue` are individually atomic. That is the only guarantee the
/// drain engines need: an operand is observed by at most one consumer and is
/// never lost between a pop and a push-back.
///
/// # Examples
///
/// ```
/// use commuter::{FifoQueue, OperandQueue};
///
/// # fn main() -> Result<(), commuter::CommuteError> {
/// let queue = FifoQueue::new();
/// queue.push(1);
/// queue.push(2);
/// queue.push(3);
///
/// assert_eq!(queue.pop()?, 1);
/// assert_eq!(queue.empty_queue(), vec![2, 3]);
/// assert!(queue.is_empty());
/// # Ok(())
/// # }
/// ```
pub struct FifoQueue<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> fmt::Debug for FifoQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FifoQueue")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<T> Default for FifoQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FifoQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Create an empty queue with room for `capacity` operands
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Clone the head operand without removing it
    pub fn peek(&self) -> Result<T, CommuteError>
    where
        T: Clone,
    {
        self.inner.lock().front().cloned().ok_or(CommuteError::EmptyQueue)
    }
}

impl<T> OperandQueue<T> for FifoQueue<T> {
    fn push(&self, operand: T) {
        self.inner.lock().push_back(operand);
    }

    fn pop(&self) -> Result<T, CommuteError> {
        self.inner.lock().pop_front().ok_or(CommuteError::EmptyQueue)
    }

    fn pop_pair(&self) -> Result<(T, T), CommuteError> {
        let mut inner = self.inner.lock();
        let available = inner.len();
        match (inner.pop_front(), inner.pop_front()) {
            (Some(first), Some(second)) => Ok((first, second)),
            (first, _) => {
                // a lone operand goes back where it was
                if let Some(first) = first {
                    inner.push_front(first);
                }
                Err(CommuteError::InsufficientOperands { available })
            },
        }
    }

    fn empty_queue(&self) -> Vec<T> {
        let detached = mem::take(&mut *self.inner.lock());
        detached.into()
    }

    fn restore_front(&self, operands: Vec<T>) {
        if operands.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        inner.reserve(operands.len());
        for operand in operands.into_iter().rev() {
            inner.push_front(operand);
        }
    }

    fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

/// Operands taken out of a queue to be applied one by one.
///
/// Whatever has not been handed out when this is dropped goes to `restore`,
/// in order. That includes an unwind out of a panicking `cop`, so a drain
/// never silently drops operands it did not get to.
pub(crate) struct Pending<T, R>
where
    R: FnMut(Vec<T>),
{
    rest: vec::IntoIter<T>,
    restore: R,
}

impl<T, R> Pending<T, R>
where
    R: FnMut(Vec<T>),
{
    pub(crate) fn new(batch: Vec<T>, restore: R) -> Self {
        Self {
            rest: batch.into_iter(),
            restore,
        }
    }

    /// Operands not handed out yet
    pub(crate) fn remaining(&self) -> usize {
        self.rest.len()
    }
}

impl<T, R> Iterator for Pending<T, R>
where
    R: FnMut(Vec<T>),
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.rest.next()
    }
}

impl<T, R> Drop for Pending<T, R>
where
    R: FnMut(Vec<T>),
{
    fn drop(&mut self) {
        if !self.rest.as_slice().is_empty() {
            let rest: Vec<T> = self.rest.by_ref().collect();
            (self.restore)(rest);
        }
    }
}
