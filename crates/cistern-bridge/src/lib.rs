//! cistern-bridge: HTTP clients for the two external collaborators
//!
//! The bridge brokers metadata: frames, shard registrations (which assign
//! mirrors), pointer listings, and the thin bucket/file CRUD surface. The
//! mirrors hold the shard bytes themselves, reachable through short-lived
//! authorized URLs carried by pointers.
//!
//! Both clients wrap one pooled `reqwest::Client` and are cheap to clone, so
//! any number of concurrent sessions can share a single connection layer.

pub mod client;
pub mod error;
pub mod mirror;
pub mod types;

pub use client::BridgeClient;
pub use error::{BridgeError, MirrorError};
pub use mirror::MirrorClient;
pub use types::{Bucket, FileInfo, FileRecord, Frame, Pointer};
