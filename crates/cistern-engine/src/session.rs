//! Session handles and the caller-facing event contract
//!
//! Creating a transfer returns a handle immediately; the work proceeds on
//! background tasks. The handle supports cooperative cancellation, progress
//! queries, and join. Exactly one of `on_finish` / `on_fail` / `on_cancel`
//! fires per session, exactly once, from the session's driver task.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use cistern_core::{DownloadResult, ShardMeta, ShardStatus, TransferOutcome, UploadResult};

use crate::progress::FULL_BP;

/// Events observed by the caller of an upload session.
///
/// All methods default to no-ops; implement the ones you care about.
pub trait UploadEvents: Send + Sync + 'static {
    fn on_begin(&self, _file_size: u64) {}
    fn on_progress(&self, _fraction: f32) {}
    fn on_finish(&self, _result: &UploadResult) {}
    fn on_fail(&self, _reason: &str) {}
    fn on_cancel(&self) {}
}

/// Events observed by the caller of a download session.
pub trait DownloadEvents: Send + Sync + 'static {
    fn on_begin(&self, _total_size: u64) {}
    fn on_progress(&self, _fraction: f32) {}
    fn on_finish(&self, _result: &DownloadResult) {}
    fn on_fail(&self, _reason: &str) {}
    fn on_cancel(&self) {}
}

/// Observer that ignores every event.
pub struct NullEvents;

impl UploadEvents for NullEvents {}
impl DownloadEvents for NullEvents {}

/// Handle to a running transfer session.
pub struct SessionHandle<T> {
    cancel: CancellationToken,
    fraction_bp: Arc<AtomicU32>,
    driver: JoinHandle<TransferOutcome<T>>,
}

/// Handle to a running upload session.
pub type Uploader = SessionHandle<UploadResult>;

/// Handle to a running download session.
pub type Downloader = SessionHandle<DownloadResult>;

impl<T> SessionHandle<T> {
    pub(crate) fn new(
        cancel: CancellationToken,
        fraction_bp: Arc<AtomicU32>,
        driver: JoinHandle<TransferOutcome<T>>,
    ) -> Self {
        Self {
            cancel,
            fraction_bp,
            driver,
        }
    }

    /// Request cooperative cancellation. Observed within one
    /// shard-operation boundary; no new shard work is dispatched after.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Last recorded progress fraction in `[0, 1]`.
    pub fn progress(&self) -> f32 {
        self.fraction_bp.load(Ordering::Relaxed) as f32 / FULL_BP as f32
    }

    /// Await the terminal outcome. Returns promptly after cancellation.
    pub async fn join(self) -> TransferOutcome<T> {
        match self.driver.await {
            Ok(outcome) => outcome,
            Err(e) => TransferOutcome::Failed(format!("session driver failed: {e}")),
        }
    }
}

/// The session's shard table: status and hash per shard index.
///
/// Workers hold an index into this table plus token handles — never a
/// reference back to the session — so there are no reference cycles.
pub(crate) struct ShardTable {
    entries: Mutex<Vec<ShardMeta>>,
    statuses: Mutex<Vec<ShardStatus>>,
}

impl ShardTable {
    pub(crate) fn new(spans: impl Iterator<Item = (u64, u64)>) -> Self {
        let entries: Vec<ShardMeta> = spans
            .enumerate()
            .map(|(index, (offset, size))| ShardMeta {
                index: index as u64,
                offset,
                size,
                hash: None,
            })
            .collect();
        let statuses = vec![ShardStatus::Pending; entries.len()];
        Self {
            entries: Mutex::new(entries),
            statuses: Mutex::new(statuses),
        }
    }

    pub(crate) fn len(&self) -> u64 {
        self.entries.lock().expect("shard table lock").len() as u64
    }

    pub(crate) fn span(&self, index: u64) -> (u64, u64) {
        let entries = self.entries.lock().expect("shard table lock");
        let entry = &entries[index as usize];
        (entry.offset, entry.size)
    }

    pub(crate) fn set_status(&self, index: u64, status: ShardStatus) {
        self.statuses.lock().expect("shard table lock")[index as usize] = status;
    }

    pub(crate) fn set_hash(&self, index: u64, hash: String) {
        self.entries.lock().expect("shard table lock")[index as usize].hash = Some(hash);
    }

    pub(crate) fn all_done(&self) -> bool {
        self.statuses
            .lock()
            .expect("shard table lock")
            .iter()
            .all(|s| *s == ShardStatus::Done)
    }

    /// The full ordered hash list, if every shard has one.
    pub(crate) fn ordered_hashes(&self) -> Option<Vec<String>> {
        self.entries
            .lock()
            .expect("shard table lock")
            .iter()
            .map(|e| e.hash.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_tracks_status_and_hashes() {
        let table = ShardTable::new([(0u64, 4u64), (4, 4), (8, 2)].into_iter());
        assert_eq!(table.len(), 3);
        assert_eq!(table.span(2), (8, 2));
        assert!(!table.all_done());
        assert!(table.ordered_hashes().is_none());

        for index in 0..3 {
            table.set_status(index, ShardStatus::Done);
            table.set_hash(index, format!("hash-{index}"));
        }

        assert!(table.all_done());
        assert_eq!(
            table.ordered_hashes().unwrap(),
            vec!["hash-0", "hash-1", "hash-2"]
        );
    }
}
