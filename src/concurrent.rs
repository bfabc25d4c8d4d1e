use crate::{
    CommuteError,
    config::{CancelToken, DrainConfig},
    partition::{partition, split_batch},
    queue::Pending,
    sequential::SequentialDrain,
    traits::{Commuter, OperandQueue},
};
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use std::{
    fmt, mem,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
};
use tracing::{debug, warn};

/// Summary of a finished concurrent drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Total operands applied across all workers.
    pub applied: usize,
    /// Operands applied by each worker that was started, indexed by worker.
    ///
    /// A drain never starts more workers than it has operands to apply, so
    /// this can be shorter than the configured worker count.
    pub per_worker: Vec<usize>,
}

impl DrainReport {
    fn from_workers(per_worker: Vec<usize>) -> Self {
        Self {
            applied: per_worker.iter().sum(),
            per_worker,
        }
    }
}

/// Handle to a detached drain started by one of the `spawn_*` methods.
///
/// Dropping the handle detaches the drain: it keeps running, and the caller
/// learns nothing about when (or whether) it finished. Keep the handle to
/// [`join`](DrainHandle::join) or [`cancel`](DrainHandle::cancel) it.
pub struct DrainHandle {
    handle: thread::JoinHandle<Result<DrainReport, CommuteError>>,
    cancel: CancelToken,
}

impl fmt::Debug for DrainHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrainHandle")
            .field("finished", &self.is_finished())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl DrainHandle {
    /// Ask the drain's workers to stop after their current operand
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Check whether every worker has finished
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Get the token this drain checks for cancellation
    pub const fn token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Block until the drain is done and return its outcome
    pub fn join(self) -> Result<DrainReport, CommuteError> {
        self.handle
            .join()
            .unwrap_or(Err(CommuteError::SupervisorPanicked))
    }
}

/// Multi-threaded drain operations, available on every [`Commuter`] that can
/// be shared between threads.
///
/// Two completion modes are offered for each operation:
///
/// - `par_*` methods block until every worker has finished and report the
///   first worker error, if any
/// - `spawn_*` methods return a [`DrainHandle`] immediately; the queue is not
///   drained when they return
///
/// Workers call `cop` from different threads without any ordering between
/// them, so the commuting contract on [`Commuter`] is what makes the result
/// well defined.
pub trait ConcurrentDrain: Commuter + Sync {
    /// Detach the backlog and apply it with `workers` threads, blocking until
    /// they finish.
    ///
    /// See [`ConcurrentDrain::par_collapse_queue_with`].
    fn par_collapse_queue(&self, workers: usize) -> Result<DrainReport, CommuteError>
    where
        Self::Operand: Send,
    {
        self.par_collapse_queue_with(&DrainConfig::new(workers))
    }

    /// Detach the backlog and apply it across workers, blocking until they
    /// finish.
    ///
    /// The backlog is detached atomically and split into one contiguous slice
    /// per worker; the remainder of an uneven split is assigned according to
    /// the configured [`RemainderPolicy`](crate::RemainderPolicy). Each worker
    /// applies its slice in FIFO order. Operands pushed during the drain are
    /// left for the next one.
    ///
    /// # Errors
    ///
    /// - `InvalidWorkerCount` before anything is detached, if the config asks
    ///   for zero workers
    /// - the first error raised by `cop` in any worker, once all workers have
    ///   been joined
    /// - `Cancelled` if the token stopped the drain with operands left over
    ///
    /// In every error case, a panicking worker included, the operands no
    /// worker got to are restored to the head of the queue in their original
    /// order.
    ///
    /// At most one worker per operand is started, so a worker count larger
    /// than the backlog is valid and simply leaves the extra workers out.
    fn par_collapse_queue_with(&self, config: &DrainConfig) -> Result<DrainReport, CommuteError>
    where
        Self::Operand: Send,
    {
        config.validate()?;
        let batch = self.queue().empty_queue();
        collapse_batch(self, batch, config)
    }

    /// Apply operands with `workers` threads until at most `desired_len`
    /// remain, blocking until they finish.
    ///
    /// See [`ConcurrentDrain::par_cut_queue_with`].
    fn par_cut_queue(
        &self,
        desired_len: usize,
        workers: usize,
    ) -> Result<DrainReport, CommuteError>
    where
        Self::Operand: Send,
    {
        self.par_cut_queue_with(desired_len, &DrainConfig::new(workers))
    }

    /// Apply operands across workers until at most `desired_len` remain.
    ///
    /// The number of operations, `len - desired_len`, is fixed when the call
    /// starts and kept in one shared atomic counter. Each worker claims a unit
    /// from the counter before every dequeue, so together they never apply
    /// more than that many operands, even if producers keep the queue full. A
    /// worker also stops if the queue runs dry. A no-op when the queue is
    /// already at or below `desired_len`. No more workers are started than
    /// there are operations to run.
    fn par_cut_queue_with(
        &self,
        desired_len: usize,
        config: &DrainConfig,
    ) -> Result<DrainReport, CommuteError>
    where
        Self::Operand: Send,
    {
        config.validate()?;
        let num_ops = self.queue().len().saturating_sub(desired_len);
        cut_counted(self, num_ops, config)
    }

    /// Detach the backlog and apply it with `workers` threads in the
    /// background.
    ///
    /// See [`ConcurrentDrain::spawn_collapse_queue_with`].
    fn spawn_collapse_queue(self: &Arc<Self>, workers: usize) -> Result<DrainHandle, CommuteError>
    where
        Self: Send + 'static,
        Self::Operand: Send + 'static,
    {
        self.spawn_collapse_queue_with(DrainConfig::new(workers))
    }

    /// Detach the backlog now and apply it across workers in the background.
    ///
    /// Returns as soon as the drain is started. The detach happens before
    /// this returns, so operands pushed afterwards are never part of this
    /// drain. Nothing about completion is guaranteed unless the returned
    /// handle is joined.
    fn spawn_collapse_queue_with(
        self: &Arc<Self>,
        config: DrainConfig,
    ) -> Result<DrainHandle, CommuteError>
    where
        Self: Send + 'static,
        Self::Operand: Send + 'static,
    {
        config.validate()?;
        let pending = Arc::new(Mutex::new(self.queue().empty_queue()));
        let token = config.token().clone();
        let name = config.supervisor_name();

        let commuter = Arc::clone(self);
        let job = Arc::clone(&pending);
        let spawned = thread::Builder::new().name(name).spawn(move || {
            let batch = mem::take(&mut *job.lock());
            collapse_batch(&*commuter, batch, &config)
        });

        match spawned {
            Ok(handle) => Ok(DrainHandle {
                handle,
                cancel: token,
            }),
            Err(err) => {
                self.queue().restore_front(mem::take(&mut *pending.lock()));
                Err(CommuteError::Spawn(err))
            },
        }
    }

    /// Cut the queue to `desired_len` with `workers` threads in the
    /// background.
    ///
    /// See [`ConcurrentDrain::spawn_cut_queue_with`].
    fn spawn_cut_queue(
        self: &Arc<Self>,
        desired_len: usize,
        workers: usize,
    ) -> Result<DrainHandle, CommuteError>
    where
        Self: Send + 'static,
        Self::Operand: Send + 'static,
    {
        self.spawn_cut_queue_with(desired_len, DrainConfig::new(workers))
    }

    /// Cut the queue to `desired_len` across workers in the background.
    ///
    /// The operation count is computed before this returns, from the queue
    /// length at call time.
    fn spawn_cut_queue_with(
        self: &Arc<Self>,
        desired_len: usize,
        config: DrainConfig,
    ) -> Result<DrainHandle, CommuteError>
    where
        Self: Send + 'static,
        Self::Operand: Send + 'static,
    {
        config.validate()?;
        let num_ops = self.queue().len().saturating_sub(desired_len);
        let token = config.token().clone();
        let commuter = Arc::clone(self);

        let handle = thread::Builder::new()
            .name(config.supervisor_name())
            .spawn(move || cut_counted(&*commuter, num_ops, &config))?;

        Ok(DrainHandle {
            handle,
            cancel: token,
        })
    }
}

impl<C> ConcurrentDrain for C where C: Commuter + Sync + ?Sized {}

/// First failure observed by any worker of one drain.
#[derive(Default)]
struct FirstError {
    failed: AtomicBool,
    error: Mutex<Option<CommuteError>>,
}

impl FirstError {
    fn record(&self, err: CommuteError) {
        let mut slot = self.error.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
        self.failed.store(true, Ordering::Release);
    }

    fn is_set(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    fn into_inner(self) -> Option<CommuteError> {
        self.error.into_inner()
    }
}

fn should_stop(config: &DrainConfig, errors: &FirstError) -> bool {
    config.token().is_cancelled() || (config.cancels_on_error() && errors.is_set())
}

/// Split `batch` across workers and apply every slice, restoring whatever the
/// workers leave behind.
fn collapse_batch<C>(
    commuter: &C,
    batch: Vec<C::Operand>,
    config: &DrainConfig,
) -> Result<DrainReport, CommuteError>
where
    C: Commuter + Sync + ?Sized,
    C::Operand: Send,
{
    let operands = batch.len();
    let workers = config.workers().min(operands);
    if workers == 0 {
        debug!("parallel collapse found nothing to apply");
        return Ok(DrainReport::default());
    }
    let ranges = partition(operands, workers, config.remainder_policy());
    // a worker takes its slice out of the slot and puts back what it could
    // not apply; slots of workers that never started keep their slice
    let slots: Vec<Mutex<Vec<C::Operand>>> = split_batch(batch, &ranges)
        .into_iter()
        .map(Mutex::new)
        .collect();
    let errors = FirstError::default();

    debug!(workers, operands, "parallel collapse started");

    let per_worker = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(slots.len());
        for (worker, slot) in slots.iter().enumerate() {
            let errors = &errors;
            let spawned = thread::Builder::new()
                .name(config.worker_name(worker))
                .spawn_scoped(scope, move || {
                    apply_slice(commuter, worker, slot, config, errors)
                });
            match spawned {
                Ok(handle) => handles.push(Some(handle)),
                Err(err) => {
                    warn!(worker, error = %err, "failed to spawn drain worker");
                    errors.record(CommuteError::Spawn(err));
                    handles.push(None);
                },
            }
        }

        handles
            .into_iter()
            .enumerate()
            .map(|(worker, handle)| match handle {
                Some(handle) => handle.join().unwrap_or_else(|_| {
                    warn!(worker, "drain worker panicked");
                    errors.record(CommuteError::WorkerPanicked { worker });
                    0
                }),
                None => 0,
            })
            .collect::<Vec<_>>()
    });

    let leftover: Vec<C::Operand> = slots.into_iter().flat_map(Mutex::into_inner).collect();
    finish(commuter, DrainReport::from_workers(per_worker), leftover, errors, config)
}

fn apply_slice<C>(
    commuter: &C,
    worker: usize,
    slot: &Mutex<Vec<C::Operand>>,
    config: &DrainConfig,
    errors: &FirstError,
) -> usize
where
    C: Commuter + ?Sized,
{
    let slice = mem::take(&mut *slot.lock());
    debug!(worker, operands = slice.len(), "drain worker started");

    // unapplied operands go back to the slot, also when `cop` panics
    let mut pending = Pending::new(slice, |rest| slot.lock().extend(rest));
    let mut applied = 0;
    while pending.remaining() > 0 {
        if should_stop(config, errors) {
            debug!(worker, applied, left = pending.remaining(), "drain worker stopped early");
            return applied;
        }
        let Some(operand) = pending.next() else {
            break;
        };
        if let Err(err) = commuter.cop(operand) {
            warn!(worker, applied, error = %err, "drain worker failed");
            errors.record(err);
            return applied;
        }
        applied += 1;
    }

    debug!(worker, applied, "drain worker finished");
    applied
}

/// Dequeue `num_ops` operands across workers sharing one counter.
fn cut_counted<C>(
    commuter: &C,
    num_ops: usize,
    config: &DrainConfig,
) -> Result<DrainReport, CommuteError>
where
    C: Commuter + Sync + ?Sized,
    C::Operand: Send,
{
    let workers = config.workers().min(num_ops);
    if workers == 0 {
        return Ok(DrainReport::default());
    }

    // initialized before any worker starts; every claim goes through it
    let remaining = CachePadded::new(AtomicUsize::new(num_ops));
    let errors = FirstError::default();

    debug!(workers, num_ops, "parallel cut started");

    let per_worker = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let remaining = &remaining;
            let errors = &errors;
            let spawned = thread::Builder::new()
                .name(config.worker_name(worker))
                .spawn_scoped(scope, move || {
                    cut_worker(commuter, worker, remaining, config, errors)
                });
            match spawned {
                Ok(handle) => handles.push(Some(handle)),
                Err(err) => {
                    warn!(worker, error = %err, "failed to spawn drain worker");
                    errors.record(CommuteError::Spawn(err));
                    handles.push(None);
                },
            }
        }

        handles
            .into_iter()
            .enumerate()
            .map(|(worker, handle)| match handle {
                Some(handle) => handle.join().unwrap_or_else(|_| {
                    warn!(worker, "drain worker panicked");
                    errors.record(CommuteError::WorkerPanicked { worker });
                    0
                }),
                None => 0,
            })
            .collect::<Vec<_>>()
    });

    let report = DrainReport::from_workers(per_worker);
    let unclaimed = remaining.load(Ordering::Acquire);
    if let Some(err) = errors.into_inner() {
        return Err(err);
    }
    if config.token().is_cancelled() && unclaimed > 0 {
        warn!(applied = report.applied, unclaimed, "parallel cut cancelled");
        return Err(CommuteError::Cancelled {
            applied: report.applied,
        });
    }

    debug!(applied = report.applied, "parallel cut finished");
    Ok(report)
}

fn cut_worker<C>(
    commuter: &C,
    worker: usize,
    remaining: &AtomicUsize,
    config: &DrainConfig,
    errors: &FirstError,
) -> usize
where
    C: Commuter + ?Sized,
{
    let mut applied = 0;
    while !should_stop(config, errors) && claim(remaining) {
        match commuter.dequeue() {
            Ok(()) => applied += 1,
            Err(CommuteError::EmptyQueue) => {
                debug!(worker, applied, "queue ran dry");
                break;
            },
            Err(err) => {
                warn!(worker, applied, error = %err, "drain worker failed");
                errors.record(err);
                break;
            },
        }
    }
    debug!(worker, applied, "drain worker finished");
    applied
}

/// Take one unit of work from the shared counter, failing once it is zero.
fn claim(remaining: &AtomicUsize) -> bool {
    remaining
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        .is_ok()
}

fn finish<C>(
    commuter: &C,
    report: DrainReport,
    leftover: Vec<C::Operand>,
    errors: FirstError,
    config: &DrainConfig,
) -> Result<DrainReport, CommuteError>
where
    C: Commuter + ?Sized,
{
    let restored = leftover.len();
    if restored > 0 {
        warn!(
            applied = report.applied,
            restored, "restoring unapplied operands to the queue"
        );
        commuter.queue().restore_front(leftover);
    }

    if let Some(err) = errors.into_inner() {
        return Err(err);
    }
    if restored > 0 && config.token().is_cancelled() {
        return Err(CommuteError::Cancelled {
            applied: report.applied,
        });
    }

    debug!(applied = report.applied, "parallel collapse finished");
    Ok(report)
}
