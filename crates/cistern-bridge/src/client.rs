//! Bridge API client
//!
//! One pooled `reqwest::Client` with a static bearer token; cloneable, safe
//! for concurrent use by every session's workers. The transfer engines call
//! the frame/pointer methods; everything else is the thin request/response
//! CRUD surface of the bridge.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;

use cistern_core::config::BridgeConfig;

use crate::error::BridgeError;
use crate::types::{Bucket, FileInfo, FileRecord, FinalizeFrame, Frame, Pointer, RegisterShard};

#[derive(Clone, Debug)]
pub struct BridgeClient {
    http: reqwest::Client,
    base_url: String,
}

impl BridgeClient {
    pub fn new(config: &BridgeConfig) -> Result<Self, BridgeError> {
        config.check_endpoint().map_err(BridgeError::Endpoint)?;

        let mut headers = HeaderMap::new();
        if !config.token.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", config.token))
                .map_err(|_| BridgeError::Endpoint("bridge token is not valid ASCII".into()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    /// Overrides the base URL (for tests against a local mock bridge).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn expect_json<T: DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, BridgeError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BridgeError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| BridgeError::Decode(e.to_string()))
    }

    async fn expect_ok(resp: reqwest::Response) -> Result<(), BridgeError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BridgeError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    // ── Transfer-engine surface ──────────────────────────────────────────

    /// Allocate a staging frame for an upload.
    pub async fn open_frame(&self) -> Result<Frame, BridgeError> {
        let resp = self.http.post(self.url("/frames")).send().await?;
        let frame: Frame = Self::expect_json(resp).await?;
        tracing::debug!(frame = %frame.id, "frame opened");
        Ok(frame)
    }

    /// Announce one shard of a frame; the bridge assigns a mirror and
    /// returns the pointer for this attempt. Calling again for the same
    /// index yields a freshly assigned mirror, which is what the upload
    /// retry path relies on.
    pub async fn register_shard(
        &self,
        frame_id: &str,
        shard: &RegisterShard,
    ) -> Result<Pointer, BridgeError> {
        let resp = self
            .http
            .put(self.url(&format!("/frames/{frame_id}")))
            .json(shard)
            .send()
            .await?;
        Self::expect_json(resp).await
    }

    /// Best-effort abandonment of a frame that will never finalize.
    pub async fn abandon_frame(&self, frame_id: &str) {
        let resp = self
            .http
            .delete(self.url(&format!("/frames/{frame_id}")))
            .send()
            .await;
        if let Err(e) = resp.map(|_| ()) {
            tracing::debug!(frame = %frame_id, error = %e, "frame abandonment not delivered");
        }
    }

    /// One page of the ordered pointer list for a stored file.
    pub async fn list_pointers(
        &self,
        bucket_id: &str,
        file_id: &str,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Pointer>, BridgeError> {
        let resp = self
            .http
            .get(self.url(&format!("/buckets/{bucket_id}/files/{file_id}/pointers")))
            .query(&[("skip", skip.to_string()), ("limit", limit.to_string())])
            .send()
            .await?;
        Self::expect_json(resp).await
    }

    /// Promote a fully registered frame to a file record.
    pub async fn finalize_frame(
        &self,
        bucket_id: &str,
        finalize: &FinalizeFrame,
    ) -> Result<FileRecord, BridgeError> {
        let resp = self
            .http
            .post(self.url(&format!("/buckets/{bucket_id}/files")))
            .json(finalize)
            .send()
            .await?;
        let record: FileRecord = Self::expect_json(resp).await?;
        tracing::debug!(file = %record.id, "frame finalized");
        Ok(record)
    }

    // ── Thin CRUD glue ───────────────────────────────────────────────────

    /// The bridge's public info document.
    pub async fn get_info(&self) -> Result<serde_json::Value, BridgeError> {
        let resp = self.http.get(self.url("/")).send().await?;
        Self::expect_json(resp).await
    }

    pub async fn list_buckets(&self) -> Result<Vec<Bucket>, BridgeError> {
        let resp = self.http.get(self.url("/buckets")).send().await?;
        Self::expect_json(resp).await
    }

    pub async fn delete_bucket(&self, bucket_id: &str) -> Result<(), BridgeError> {
        let resp = self
            .http
            .delete(self.url(&format!("/buckets/{bucket_id}")))
            .send()
            .await?;
        Self::expect_ok(resp).await
    }

    pub async fn rename_bucket(&self, bucket_id: &str, name: &str) -> Result<(), BridgeError> {
        let resp = self
            .http
            .patch(self.url(&format!("/buckets/{bucket_id}")))
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;
        Self::expect_ok(resp).await
    }

    pub async fn list_files(&self, bucket_id: &str) -> Result<Vec<FileInfo>, BridgeError> {
        let resp = self
            .http
            .get(self.url(&format!("/buckets/{bucket_id}/files")))
            .send()
            .await?;
        Self::expect_json(resp).await
    }

    pub async fn file_info(&self, bucket_id: &str, file_id: &str) -> Result<FileInfo, BridgeError> {
        let resp = self
            .http
            .get(self.url(&format!("/buckets/{bucket_id}/files/{file_id}/info")))
            .send()
            .await?;
        Self::expect_json(resp).await
    }

    pub async fn delete_file(&self, bucket_id: &str, file_id: &str) -> Result<(), BridgeError> {
        let resp = self
            .http
            .delete(self.url(&format!("/buckets/{bucket_id}/files/{file_id}")))
            .send()
            .await?;
        Self::expect_ok(resp).await
    }

    /// Existence check by obfuscated name; the bridge never sees plaintext.
    pub async fn is_file_exist(
        &self,
        bucket_id: &str,
        obfuscated_name: &str,
    ) -> Result<bool, BridgeError> {
        let resp = self
            .http
            .get(self.url(&format!("/buckets/{bucket_id}/file-ids/{obfuscated_name}")))
            .send()
            .await?;
        match resp.status().as_u16() {
            404 => Ok(false),
            _ => Self::expect_ok(resp).await.map(|_| true),
        }
    }

    /// Replica locations of a stored file, for diagnostics.
    pub async fn list_mirrors(
        &self,
        bucket_id: &str,
        file_id: &str,
    ) -> Result<serde_json::Value, BridgeError> {
        let resp = self
            .http
            .get(self.url(&format!("/buckets/{bucket_id}/files/{file_id}/mirrors")))
            .send()
            .await?;
        Self::expect_json(resp).await
    }
}
