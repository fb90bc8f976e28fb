use serde::{Deserialize, Serialize};

/// Top-level client configuration (loaded from cistern.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub bridge: BridgeConfig,
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Bridge base URL
    pub url: String,
    /// Static bearer token sent on every bridge request; session
    /// negotiation is handled outside this client
    pub token: String,
    /// Per-request timeout in seconds, applied to bridge and mirror calls
    pub timeout_secs: u64,
    /// Enforce HTTPS for the bridge endpoint (warn/error on HTTP)
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Parallel shard pushes per upload session
    pub push_concurrency: usize,
    /// Parallel shard pulls per download session
    pub pull_concurrency: usize,
    /// Attempts per shard before the session fails; each upload attempt
    /// runs against a freshly assigned mirror
    pub shard_retries: u32,
    /// Pointers requested per bridge page when resolving a download
    pub pointer_page_size: u64,
    /// Minimum progress-fraction change between two progress reports
    pub progress_min_delta: f32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".into(),
            token: String::new(),
            timeout_secs: 30,
            enforce_tls: false,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            push_concurrency: 4,
            pull_concurrency: 4,
            shard_retries: 3,
            pointer_page_size: 16,
            progress_min_delta: 0.01,
        }
    }
}

impl BridgeConfig {
    /// Reject plaintext endpoints when TLS is enforced; warn otherwise.
    pub fn check_endpoint(&self) -> Result<(), String> {
        if self.url.starts_with("http://") {
            if self.enforce_tls {
                return Err(format!(
                    "bridge endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                     Use an HTTPS endpoint or set bridge.enforce_tls = false for local development.",
                    self.url
                ));
            }
            tracing::warn!(
                url = %self.url,
                "bridge endpoint uses plaintext HTTP — tokens are transmitted unencrypted"
            );
        }
        Ok(())
    }
}
