//! Client errors and their mapping onto the transfer taxonomy
//!
//! Transport failures and 5xx responses are the retryable `Network` class;
//! 4xx responses and undecodable bodies mean the client and bridge disagree
//! about the protocol, which no retry will fix.

use cistern_core::TransferError;
use thiserror::Error;

/// Errors talking to the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bridge returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed bridge response: {0}")]
    Decode(String),

    #[error("invalid bridge endpoint: {0}")]
    Endpoint(String),
}

/// Errors talking to a mirror.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mirror {url} returned {status}")]
    Status { url: String, status: u16 },
}

impl From<BridgeError> for TransferError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Http(e) => TransferError::Network(e.to_string()),
            BridgeError::Api { status, ref body } if status >= 500 => {
                TransferError::Network(format!("bridge returned {status}: {body}"))
            }
            other => TransferError::Protocol(other.to_string()),
        }
    }
}

impl From<MirrorError> for TransferError {
    fn from(err: MirrorError) -> Self {
        // Any mirror failure is a transport-class problem for the session:
        // the recovery path is a different mirror, not a different request
        TransferError::Network(err.to_string())
    }
}
