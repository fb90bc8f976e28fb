//! The client facade
//!
//! `Cistern` owns the shared connection layer (one pooled bridge client and
//! one mirror client) and the master secret. Any number of transfer
//! sessions may run concurrently; they share nothing but these clients.

use std::path::PathBuf;
use std::sync::Arc;

use cistern_bridge::types::{Bucket, FileInfo};
use cistern_bridge::{BridgeClient, MirrorClient};
use cistern_core::config::{ClientConfig, TransferConfig};
use cistern_core::TransferError;
use cistern_crypto::{obfuscate_name, EncryptionInfo, MasterSecret};

use crate::download::{self, DownloadRequest};
use crate::session::{DownloadEvents, Downloader, UploadEvents, Uploader};
use crate::upload::{self, UploadRequest};

pub struct Cistern {
    bridge: BridgeClient,
    mirrors: MirrorClient,
    master: MasterSecret,
    transfer: TransferConfig,
}

impl Cistern {
    pub fn new(config: ClientConfig, master: MasterSecret) -> Result<Self, TransferError> {
        let bridge = BridgeClient::new(&config.bridge)?;
        let mirrors = MirrorClient::new(config.bridge.timeout_secs)?;
        Ok(Self {
            bridge,
            mirrors,
            master,
            transfer: config.transfer,
        })
    }

    /// Direct access to the bridge API (thin CRUD surface included).
    pub fn bridge(&self) -> &BridgeClient {
        &self.bridge
    }

    /// Draw the deterministic (key, counter) pair for a new upload.
    pub fn generate_encryption_info(
        &self,
        bucket_id: &str,
    ) -> Result<EncryptionInfo, TransferError> {
        EncryptionInfo::generate(&self.master, bucket_id)
            .map_err(|e| TransferError::Crypto(e.to_string()))
    }

    /// The opaque identifier a plaintext name maps to within a bucket.
    pub fn obfuscate_name(&self, bucket_id: &str, name: &str) -> Result<String, TransferError> {
        obfuscate_name(&self.master, bucket_id, name)
            .map_err(|e| TransferError::Crypto(e.to_string()))
    }

    /// Start an upload session. Returns the handle immediately; the
    /// transfer proceeds on background workers.
    pub fn store_file(
        &self,
        source: impl Into<PathBuf>,
        name: &str,
        bucket_id: &str,
        encryption: EncryptionInfo,
        events: Arc<dyn UploadEvents>,
    ) -> Result<Uploader, TransferError> {
        let obfuscated = self.obfuscate_name(bucket_id, name)?;
        Ok(upload::start(UploadRequest {
            bridge: self.bridge.clone(),
            mirrors: self.mirrors.clone(),
            config: self.transfer.clone(),
            bucket_id: bucket_id.to_string(),
            source: source.into(),
            name: obfuscated,
            encryption: Arc::new(encryption),
            events,
        }))
    }

    /// Start a download session. Returns the handle immediately; the
    /// transfer proceeds on background workers.
    ///
    /// With `decrypt` false the destination receives the raw encrypted
    /// bytes. `expected_hash`, when given, is verified against the
    /// recomputed content hash as the last step before success.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve_file(
        &self,
        bucket_id: &str,
        file_id: &str,
        destination: impl Into<PathBuf>,
        overwrite: bool,
        decrypt: bool,
        expected_hash: Option<String>,
        events: Arc<dyn DownloadEvents>,
    ) -> Downloader {
        download::start(DownloadRequest {
            bridge: self.bridge.clone(),
            mirrors: self.mirrors.clone(),
            config: self.transfer.clone(),
            bucket_id: bucket_id.to_string(),
            file_id: file_id.to_string(),
            destination: destination.into(),
            overwrite,
            decrypt,
            expected_hash,
            master: self.master.clone(),
            events,
        })
    }

    // ── Thin CRUD glue (request/response wrappers, no session state) ─────

    pub async fn get_info(&self) -> Result<serde_json::Value, TransferError> {
        Ok(self.bridge.get_info().await?)
    }

    pub async fn list_buckets(&self) -> Result<Vec<Bucket>, TransferError> {
        Ok(self.bridge.list_buckets().await?)
    }

    pub async fn delete_bucket(&self, bucket_id: &str) -> Result<(), TransferError> {
        Ok(self.bridge.delete_bucket(bucket_id).await?)
    }

    pub async fn rename_bucket(&self, bucket_id: &str, name: &str) -> Result<(), TransferError> {
        Ok(self.bridge.rename_bucket(bucket_id, name).await?)
    }

    pub async fn list_files(&self, bucket_id: &str) -> Result<Vec<FileInfo>, TransferError> {
        Ok(self.bridge.list_files(bucket_id).await?)
    }

    pub async fn file_info(
        &self,
        bucket_id: &str,
        file_id: &str,
    ) -> Result<FileInfo, TransferError> {
        Ok(self.bridge.file_info(bucket_id, file_id).await?)
    }

    pub async fn delete_file(&self, bucket_id: &str, file_id: &str) -> Result<(), TransferError> {
        Ok(self.bridge.delete_file(bucket_id, file_id).await?)
    }

    /// Existence check by plaintext name; only the obfuscated form reaches
    /// the bridge.
    pub async fn is_file_exist(&self, bucket_id: &str, name: &str) -> Result<bool, TransferError> {
        let obfuscated = self.obfuscate_name(bucket_id, name)?;
        Ok(self.bridge.is_file_exist(bucket_id, &obfuscated).await?)
    }

    pub async fn list_mirrors(
        &self,
        bucket_id: &str,
        file_id: &str,
    ) -> Result<serde_json::Value, TransferError> {
        Ok(self.bridge.list_mirrors(bucket_id, file_id).await?)
    }
}
