//! Bounded-concurrency shard dispatch, shared by both engines
//!
//! A semaphore gates how many shard jobs run at once; a `JoinSet` owns the
//! worker tasks. Two tokens stop the pool: `cancel` is the caller's
//! cooperative cancellation, `abort` fires when a shard fails terminally so
//! in-flight siblings stand down instead of finishing doomed work. Both are
//! observed between dispatches and at every worker await point.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use cistern_core::TransferError;

/// Why a worker stopped before completing its unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stop {
    Cancelled,
    Aborted,
}

/// Race one unit of work against the session's stop signals.
pub(crate) async fn race_stop<T>(
    cancel: &CancellationToken,
    abort: &CancellationToken,
    work: impl Future<Output = T>,
) -> Result<T, Stop> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Stop::Cancelled),
        _ = abort.cancelled() => Err(Stop::Aborted),
        value = work => Ok(value),
    }
}

/// Race a phase-level operation against caller cancellation only.
///
/// `Ok(None)` means the caller cancelled while the operation was in flight;
/// the operation itself is abandoned.
pub(crate) async fn or_cancelled<T, E>(
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T, E>>,
) -> Result<Option<T>, E> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(None),
        result = work => result.map(Some),
    }
}

/// Dispatch `total` shard jobs with at most `concurrency` in flight.
///
/// Dispatch halts at the first of: all jobs dispatched, `cancel` fired, or
/// a job returning an error (which fires `abort`). Waits for every spawned
/// worker before returning. Returns the first error observed, if any; a
/// panicked worker counts as an error, never a hang.
pub(crate) async fn drive_shards<F, Fut>(
    total: u64,
    concurrency: usize,
    cancel: &CancellationToken,
    abort: &CancellationToken,
    job: F,
) -> Option<TransferError>
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = Result<(), TransferError>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut workers: JoinSet<Result<(), TransferError>> = JoinSet::new();
    let mut first_error: Option<TransferError> = None;

    for index in 0..total {
        // Observe failures of already-running workers before dispatching
        // more; the first one fires `abort` and stops dispatch
        while let Some(joined) = workers.try_join_next() {
            record(joined, &mut first_error, abort);
        }
        if cancel.is_cancelled() || abort.is_cancelled() {
            tracing::debug!(dispatched = index, total, "shard dispatch stopped");
            break;
        }

        let permit = match race_stop(cancel, abort, semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            // The semaphore is never closed; stopping is the only other exit
            Ok(Err(_)) | Err(_) => break,
        };

        let work = job(index);
        workers.spawn(async move {
            let _permit = permit;
            work.await
        });
    }

    while let Some(joined) = workers.join_next().await {
        record(joined, &mut first_error, abort);
    }

    first_error
}

fn record(
    joined: Result<Result<(), TransferError>, tokio::task::JoinError>,
    first_error: &mut Option<TransferError>,
    abort: &CancellationToken,
) {
    let result = joined
        .unwrap_or_else(|e| Err(TransferError::resource(format!("shard worker panicked: {e}"))));
    if let Err(error) = result {
        if first_error.is_none() {
            tracing::debug!(error = %error, "shard failure aborts remaining work");
            abort.cancel();
            *first_error = Some(error);
        }
    }
}
