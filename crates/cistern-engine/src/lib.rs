//! cistern-engine: the transfer core of the cistern storage client
//!
//! Upload pipeline: plan shard layout → open frame → per shard: read slice,
//! encrypt at its offset, register (mirror assignment), push → finalize the
//! frame into a file record.
//!
//! Download pipeline: resolve pointers (paged) → per shard: pull, verify
//! hash, optionally decrypt at its offset, write positionally → assemble and
//! verify the whole file.
//!
//! Both run on bounded worker pools behind a session handle that supports
//! progress observation, cooperative cancellation, and join.

pub mod client;
pub mod planner;
pub mod session;

mod download;
mod pool;
mod progress;
mod upload;

pub use client::Cistern;
pub use planner::{plan_shards, ShardPlan};
pub use session::{DownloadEvents, Downloader, NullEvents, SessionHandle, UploadEvents, Uploader};

pub use cistern_bridge::{BridgeClient, MirrorClient};
pub use cistern_core::{DownloadResult, TransferError, TransferOutcome, UploadResult};
pub use cistern_crypto::{EncryptionInfo, MasterSecret};
