//! Mirror shard transport
//!
//! Mirrors speak plain HTTP: a shard lives at the pointer's URL and is
//! readable/writable only with the pointer's access token. The client is
//! cloneable and pools connections across all sessions.

use bytes::Bytes;

use crate::error::MirrorError;
use crate::types::Pointer;

#[derive(Clone)]
pub struct MirrorClient {
    http: reqwest::Client,
}

impl MirrorClient {
    pub fn new(timeout_secs: u64) -> Result<Self, MirrorError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { http })
    }

    /// Push encrypted shard bytes to the pointer's assigned mirror.
    pub async fn push_shard(&self, pointer: &Pointer, data: Bytes) -> Result<(), MirrorError> {
        let resp = self
            .http
            .put(&pointer.url)
            .query(&[("token", pointer.token.as_str())])
            .body(data)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(MirrorError::Status {
                url: pointer.url.clone(),
                status: status.as_u16(),
            });
        }
        tracing::trace!(url = %pointer.url, index = pointer.index, "shard pushed");
        Ok(())
    }

    /// Pull encrypted shard bytes from the pointer's primary mirror.
    pub async fn pull_shard(&self, pointer: &Pointer) -> Result<Bytes, MirrorError> {
        self.pull_from(&pointer.url, &pointer.token).await
    }

    /// Pull from an explicit mirror address (the alternate-replica path).
    pub async fn pull_from(&self, url: &str, token: &str) -> Result<Bytes, MirrorError> {
        let resp = self
            .http
            .get(url)
            .query(&[("token", token)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(MirrorError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp.bytes().await?)
    }
}
