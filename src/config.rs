use crate::{CommuteError, partition::RemainderPolicy};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Cloneable flag used to stop a running drain.
///
/// Workers check the token before every operand. Once cancelled, each worker
/// hands its unapplied operands back so they can be restored to the queue,
/// and the drain returns `CommuteError::Cancelled`.
///
/// # Examples
///
/// ```
/// use commuter::CancelToken;
///
/// let token = CancelToken::new();
/// let seen_by_worker = token.clone();
/// assert!(!seen_by_worker.is_cancelled());
///
/// token.cancel();
/// assert!(seen_by_worker.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that has not been cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every drain holding this token to stop
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether [`CancelToken::cancel`] has been called
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Default thread name prefix for drain workers.
const DEFAULT_THREAD_NAME: &str = "commuter-drain";

/// Configuration for a concurrent drain.
///
/// Built with a fluent API in the same way for every concurrent operation;
/// the plain `par_*` and `spawn_*` methods that take a worker count use
/// [`DrainConfig::new`] with defaults for everything else.
///
/// # Examples
///
/// ```
/// use commuter::{CancelToken, DrainConfig, RemainderPolicy};
///
/// let token = CancelToken::new();
/// let config = DrainConfig::new(4)
///     .remainder(RemainderPolicy::Spread)
///     .cancel_on_error(true)
///     .cancel_token(token.clone())
///     .thread_name("totals");
///
/// assert_eq!(config.workers(), 4);
/// assert!(config.validate().is_ok());
/// assert!(DrainConfig::new(0).validate().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct DrainConfig {
    workers: usize,
    remainder: RemainderPolicy,
    cancel_on_error: bool,
    cancel: CancelToken,
    thread_name: String,
}

impl DrainConfig {
    /// Create a configuration for `workers` threads
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            remainder: RemainderPolicy::default(),
            cancel_on_error: false,
            cancel: CancelToken::new(),
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }

    /// Set where the leftover operands of an uneven split go
    #[must_use]
    pub fn remainder(mut self, policy: RemainderPolicy) -> Self {
        self.remainder = policy;
        self
    }

    /// Stop sibling workers as soon as one worker fails
    #[must_use]
    pub fn cancel_on_error(mut self, enabled: bool) -> Self {
        self.cancel_on_error = enabled;
        self
    }

    /// Use `token` to cancel the drain from outside
    #[must_use]
    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Set the name prefix for worker threads; worker `i` is named
    /// `{prefix}-{i}`
    #[must_use]
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    /// Get the worker count
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Get the remainder policy
    pub const fn remainder_policy(&self) -> RemainderPolicy {
        self.remainder
    }

    /// Check whether a failure stops sibling workers
    pub const fn cancels_on_error(&self) -> bool {
        self.cancel_on_error
    }

    /// Get the cancellation token
    pub const fn token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Reject configurations no drain can run with
    pub fn validate(&self) -> Result<(), CommuteError> {
        if self.workers == 0 {
            return Err(CommuteError::InvalidWorkerCount {
                workers: self.workers,
            });
        }
        Ok(())
    }

    pub(crate) fn worker_name(&self, worker: usize) -> String {
        format!("{}-{worker}", self.thread_name)
    }

    pub(crate) fn supervisor_name(&self) -> String {
        format!("{}-supervisor", self.thread_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DrainConfig::new(3);
        assert_eq!(config.workers(), 3);
        assert_eq!(config.remainder_policy(), RemainderPolicy::LastWorker);
        assert!(!config.cancels_on_error());
        assert!(!config.token().is_cancelled());
        assert_eq!(config.worker_name(2), "commuter-drain-2");
    }

    #[test]
    fn zero_workers_rejected() {
        assert!(matches!(
            DrainConfig::new(0).validate(),
            Err(CommuteError::InvalidWorkerCount { workers: 0 })
        ));
    }

    #[test]
    fn token_is_shared_between_clones() {
        let token = CancelToken::new();
        let config = DrainConfig::new(1).cancel_token(token.clone());
        let copy = config.clone();
        token.cancel();
        assert!(config.token().is_cancelled());
        assert!(copy.token().is_cancelled());
    }

    #[test]
    fn thread_names() {
        let config = DrainConfig::new(2).thread_name("totals");
        assert_eq!(config.worker_name(0), "totals-0");
        assert_eq!(config.supervisor_name(), "totals-supervisor");
    }
}
