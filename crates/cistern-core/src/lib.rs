pub mod config;
pub mod error;
pub mod types;

pub use config::{BridgeConfig, ClientConfig, TransferConfig};
pub use error::TransferError;
pub use types::{DownloadResult, ShardMeta, ShardStatus, TransferOutcome, UploadResult};
