use thiserror::Error;

/// Terminal error classes for a transfer session.
///
/// The class decides how the worker pool reacts: `Network` is retryable per
/// shard within the configured budget, `Integrity` gets exactly one retry
/// against an alternate source, everything else fails the session outright.
/// Cancellation is not an error and has no variant here — it is a distinct
/// terminal outcome ([`crate::types::TransferOutcome::Cancelled`]).
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("network error: {0}")]
    Network(String),

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("bridge protocol error: {0}")]
    Protocol(String),

    #[error("resource error: {0}")]
    Resource(#[from] std::io::Error),
}

impl TransferError {
    /// Whether a shard-level occurrence of this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::Network(_))
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        TransferError::Resource(std::io::Error::other(msg.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_errors_are_retryable() {
        assert!(TransferError::Network("timeout".into()).is_retryable());
        assert!(!TransferError::Integrity("hash mismatch".into()).is_retryable());
        assert!(!TransferError::Crypto("bad key".into()).is_retryable());
        assert!(!TransferError::Protocol("unexpected body".into()).is_retryable());
        assert!(!TransferError::resource("disk full").is_retryable());
    }

    #[test]
    fn messages_are_human_readable() {
        let err = TransferError::Integrity("shard 3 hash mismatch".into());
        assert_eq!(
            err.to_string(),
            "integrity check failed: shard 3 hash mismatch"
        );
    }
}
