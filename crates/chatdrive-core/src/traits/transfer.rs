//! Remote file transfer contract (SFTP or equivalent).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::TransferEndpoint;
use crate::result::AppResult;
use crate::traits::ByteStream;

/// One entry in a remote directory listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Full path of the entry on the remote.
    pub path: String,
    /// Size in bytes; 0 for directories.
    pub size_bytes: u64,
    /// Whether this entry is a directory.
    pub is_directory: bool,
}

/// Factory for connections to a remote transfer endpoint.
#[async_trait]
pub trait TransferClient: Send + Sync + std::fmt::Debug {
    /// Open a session against the endpoint.
    ///
    /// Rejected credentials surface as authentication errors (fatal);
    /// unreachable hosts and resets surface as network errors (transient).
    async fn connect(&self, endpoint: &TransferEndpoint) -> AppResult<Box<dyn TransferSession>>;
}

/// An open connection to a remote endpoint.
///
/// Enumeration is not restartable from a cursor; after a reconnect the
/// caller enumerates again from the top.
#[async_trait]
pub trait TransferSession: Send + Sync {
    /// List the entries directly under `path`.
    async fn list_entries(&self, path: &str) -> AppResult<Vec<RemoteEntry>>;

    /// Read a single remote file as a byte stream.
    async fn read_entry(&self, path: &str) -> AppResult<ByteStream>;
}
