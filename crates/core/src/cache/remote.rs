//! Shared second-level cache layer.
//!
//! The local layer is private to one process; a remote layer is shared by
//! every process pointed at the same address. Values are opaque blobs.

use crate::Error;
use async_trait::async_trait;

/// String-keyed blob store used behind the local cache layer.
///
/// Implementations handle their own concurrency. Every method may fail; the
/// cache store treats any failure as a miss and keeps serving locally.
#[async_trait]
pub trait RemoteLayer: Send + Sync + std::fmt::Debug {
    /// Fetch a live value. Values past their expiry are reported as absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Store a value that expires after `ttl_seconds`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl_seconds: u64) -> Result<(), Error>;

    async fn delete(&self, key: &str) -> Result<(), Error>;

    /// Reset the expiry of an existing key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool, Error>;

    /// All live keys starting with `prefix` (empty prefix lists everything).
    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, Error>;

    /// Remove every key.
    async fn flush(&self) -> Result<(), Error>;

    /// Drop rows past their expiry. Returns how many were removed.
    async fn purge_expired(&self) -> Result<u64, Error> {
        Ok(0)
    }
}
