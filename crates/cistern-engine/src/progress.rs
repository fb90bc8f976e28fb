//! Rate-bounded progress accounting
//!
//! Workers add confirmed bytes as shards complete; a report is due only when
//! the fraction moved by at least the configured delta since the last one,
//! so callers see a bounded event rate instead of per-chunk noise.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// Fractions are tracked in basis points (1/10000) so they fit an atomic.
pub(crate) const FULL_BP: u32 = 10_000;

pub(crate) struct ProgressMeter {
    total: u64,
    done: AtomicU64,
    last_reported_bp: AtomicU32,
    min_delta_bp: u32,
    /// Mirrored into the session handle for `progress()` queries
    shared_bp: Arc<AtomicU32>,
}

impl ProgressMeter {
    pub(crate) fn new(total: u64, min_delta: f32, shared_bp: Arc<AtomicU32>) -> Self {
        let min_delta_bp = ((min_delta.clamp(0.0, 1.0) * FULL_BP as f32) as u32).max(1);
        Self {
            total,
            done: AtomicU64::new(0),
            last_reported_bp: AtomicU32::new(0),
            min_delta_bp,
            shared_bp,
        }
    }

    /// Record `bytes` more confirmed bytes. Returns the fraction to report
    /// if this crossing is due, at most once per threshold crossing even
    /// under racing workers.
    pub(crate) fn add(&self, bytes: u64) -> Option<f32> {
        let done = self.done.fetch_add(bytes, Ordering::Relaxed) + bytes;
        let bp = if self.total == 0 {
            FULL_BP
        } else {
            (((done as f64 / self.total as f64) * FULL_BP as f64) as u32).min(FULL_BP)
        };
        self.shared_bp.store(bp, Ordering::Relaxed);

        let last = self.last_reported_bp.load(Ordering::Relaxed);
        let due = bp >= last.saturating_add(self.min_delta_bp) || (bp == FULL_BP && last < FULL_BP);
        if due
            && self
                .last_reported_bp
                .compare_exchange(last, bp, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            return Some(bp as f32 / FULL_BP as f32);
        }
        None
    }
}
