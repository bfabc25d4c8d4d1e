//! # Commuter: Queues of Commuting Operations
//!
//! Commuter accumulates a backlog of operands destined for a single
//! commuting operation (`cop`) over some shared state, and gives you the
//! orchestration around that backlog:
//!
//! - **Sequential drains**: apply one operand, the whole backlog, or just
//!   enough to cut the backlog down to a target length
//! - **Concurrent drains**: partition the backlog across worker threads, either
//!   blocking until they finish or detaching them
//! - **Compression**: fold pairs of pending operands into one equivalent
//!   operand with a caller-supplied [`Commutator`], shrinking the backlog
//!   without running the real operation
//!
//! What `cop` *means* is entirely up to you. The crate only assumes the
//! operation commutes: applying `a` then `b` leaves the same observable state
//! as applying `b` then `a`.
//!
//! ## Sequential Drains
//!
//! ```rust
//! use commuter::{FnCommuter, SequentialDrain};
//! use std::sync::atomic::{AtomicI64, Ordering};
//!
//! # fn main() -> Result<(), commuter::CommuteError> {
//! let total = AtomicI64::new(0);
//! let adder = FnCommuter::new(|x: i64| {
//!     total.fetch_add(x, Ordering::SeqCst);
//!     Ok(())
//! });
//!
//! for x in [3, 4, 5] {
//!     adder.aggregate_op(x);
//! }
//! adder.collapse_queue()?;
//! assert_eq!(total.load(Ordering::SeqCst), 12);
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrent Drains
//!
//! Every worker receives one contiguous slice of the detached backlog. Slices
//! are applied in FIFO order; across workers nothing is ordered, which is only
//! sound because `cop` commutes.
//!
//! ```rust
//! use commuter::{ConcurrentDrain, FnCommuter, SequentialDrain};
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! # fn main() -> Result<(), commuter::CommuteError> {
//! let total = AtomicU64::new(0);
//! let adder = FnCommuter::new(|x: u64| {
//!     total.fetch_add(x, Ordering::SeqCst);
//!     Ok(())
//! });
//!
//! for x in 1..=10 {
//!     adder.aggregate_op(x);
//! }
//! let report = adder.par_collapse_queue(3)?;
//! assert_eq!(report.per_worker, vec![3, 3, 4]);
//! assert_eq!(total.load(Ordering::SeqCst), 55);
//! # Ok(())
//! # }
//! ```
//!
//! ## Compression
//!
//! ```rust
//! use commuter::{CommuteError, CommuterWithCommutator, FnCommuter, OperandQueue, Commuter};
//!
//! # fn main() -> Result<(), CommuteError> {
//! let adder = FnCommuter::new(|_x: i64| Ok(()));
//! let merged = CommuterWithCommutator::new(adder, |a: &i64, b: &i64| -> Result<i64, CommuteError> {
//!     Ok(a + b)
//! });
//!
//! for x in [3, 4, 5, 6] {
//!     merged.commuter().queue().push(x);
//! }
//! merged.compress_queue(2)?;
//! assert_eq!(merged.commuter().queue().empty_queue(), vec![7, 11]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`CommuteError`]:
//! - `CommuteError::EmptyQueue` - Nothing left to pop
//! - `CommuteError::InvalidWorkerCount` - A concurrent drain asked for zero
//!   workers
//! - `CommuteError::InsufficientOperands` - A compression round needs two
//!   operands
//! - `CommuteError::Operation` - `cop` or the commutator failed
//! - `CommuteError::Cancelled` - A drain was stopped through its
//!   [`CancelToken`]
//!
//! Operands a drain did not get to are put back at the head of the queue in
//! their original order, so partial progress is always visible through the
//! queue length.
#![deny(
    missing_docs,
    unused_imports,
    unused_variables,
    dead_code,
    unreachable_code,
    unused_must_use
)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::multiple_crate_versions
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Capability traits: [`OperandQueue`], [`Commuter`] and [`Commutator`].
///
/// A type participates in the drain engines by implementing [`Commuter`];
/// compression additionally needs a [`Commutator`].
pub mod traits;

/// Mutex-guarded FIFO queue of operands.
///
/// [`FifoQueue`] is the default [`OperandQueue`] backing every commuter in
/// this crate.
pub mod queue;

/// A closure-backed [`Commuter`].
pub mod commuter;

/// Single-threaded drains: dequeue, collapse and cut.
pub mod sequential;

/// Slicing a detached backlog across workers.
pub mod partition;

/// Drain configuration and cancellation.
pub mod config;

/// Multi-threaded drains, blocking and detached.
pub mod concurrent;

/// Commutator-driven queue compression.
pub mod compressor;

pub use commuter::FnCommuter;
pub use compressor::CommuterWithCommutator;
pub use concurrent::{ConcurrentDrain, DrainHandle, DrainReport};
pub use config::{CancelToken, DrainConfig};
pub use partition::RemainderPolicy;
pub use queue::FifoQueue;
pub use sequential::SequentialDrain;
pub use traits::{Commutator, Commuter, OperandQueue};

use thiserror::Error;

/// Boxed error raised by a commuting operation or a commutator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while queuing, draining or compressing.
#[derive(Debug, Error)]
pub enum CommuteError {
    /// The queue contains no operands.
    ///
    /// Returned by `pop` and `dequeue` on an empty queue. Nothing is applied
    /// and the commuter's state is unchanged.
    #[error("queue is empty")]
    EmptyQueue,

    /// A concurrent drain was asked to run with zero workers.
    ///
    /// The check happens before the queue is touched, so no worker is spawned
    /// and the backlog is left as it was.
    #[error("invalid worker count {workers}: at least one worker is required")]
    InvalidWorkerCount {
        /// The rejected worker count.
        workers: usize,
    },

    /// A compression round found fewer than two operands.
    #[error("compression needs two operands, found {available}")]
    InsufficientOperands {
        /// How many operands were in the queue when the round began.
        available: usize,
    },

    /// The commuting operation or the commutator reported a failure.
    #[error("operation failed: {0}")]
    Operation(#[source] BoxError),

    /// The drain was stopped through its [`CancelToken`].
    ///
    /// Operands that were not applied have been restored to the queue.
    #[error("drain cancelled after {applied} operands")]
    Cancelled {
        /// Operands applied before the drain stopped.
        applied: usize,
    },

    /// A worker thread panicked while applying operands.
    #[error("drain worker {worker} panicked")]
    WorkerPanicked {
        /// Index of the worker that panicked.
        worker: usize,
    },

    /// The background thread running a detached drain panicked.
    #[error("drain supervisor panicked")]
    SupervisorPanicked,

    /// The operating system refused to spawn a worker thread.
    #[error("failed to spawn drain worker: {0}")]
    Spawn(#[from] std::io::Error),
}

impl CommuteError {
    /// Wrap a domain error raised inside `cop` or a commutator.
    ///
    /// ```rust
    /// use commuter::CommuteError;
    ///
    /// let err = CommuteError::operation("overflow");
    /// assert_eq!(err.to_string(), "operation failed: overflow");
    /// ```
    pub fn operation(err: impl Into<BoxError>) -> Self {
        Self::Operation(err.into())
    }
}
