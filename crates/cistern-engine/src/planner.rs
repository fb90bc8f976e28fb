//! Shard layout policy
//!
//! The policy trades per-shard overhead (frame registrations, mirror
//! round-trips) against transfer parallelism, and bounds both extremes: no
//! dust of tiny shards for large files, no single unsplittable monolith.
//! Shard size starts at 2 MiB and doubles until the file fits in at most
//! `MAX_SHARD_COUNT` shards, capped at 64 MiB per shard.

use cistern_core::TransferError;

/// Smallest shard the planner will produce (except a short final shard)
pub const MIN_SHARD_SIZE: u64 = 2 * 1024 * 1024;

/// Largest shard the planner will produce
pub const MAX_SHARD_SIZE: u64 = 64 * 1024 * 1024;

/// Preferred upper bound on shard count; only exceeded once the shard size
/// cap is reached (files beyond `MAX_SHARD_COUNT * MAX_SHARD_SIZE`)
pub const MAX_SHARD_COUNT: u64 = 1024;

/// Shard layout for one file: `count` shards of `shard_size` bytes, the
/// last one possibly shorter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardPlan {
    pub file_size: u64,
    pub shard_size: u64,
    pub count: u64,
}

impl ShardPlan {
    /// Byte span (offset, size) of the shard at `index`.
    pub fn span(&self, index: u64) -> (u64, u64) {
        debug_assert!(index < self.count);
        let offset = index * self.shard_size;
        let size = self.shard_size.min(self.file_size - offset);
        (offset, size)
    }
}

/// Decide shard count and size for a file of `file_size` bytes.
pub fn plan_shards(file_size: u64) -> Result<ShardPlan, TransferError> {
    if file_size == 0 {
        return Err(TransferError::resource("source file is empty"));
    }

    let mut shard_size = MIN_SHARD_SIZE;
    while shard_size < MAX_SHARD_SIZE && file_size.div_ceil(shard_size) > MAX_SHARD_COUNT {
        shard_size *= 2;
    }

    let count = file_size.div_ceil(shard_size);
    tracing::debug!(file_size, shard_size, count, "shard layout planned");

    Ok(ShardPlan {
        file_size,
        shard_size,
        count,
    })
}
