//! Archive and encryption transform contracts.

use async_trait::async_trait;

use crate::model::CompressionFormat;
use crate::result::AppResult;
use crate::traits::ByteStream;
use crate::types::TaskId;

/// Builds a single archive stream from a set of named file streams.
#[async_trait]
pub trait Compressor: Send + Sync + std::fmt::Debug {
    /// Compress `entries` into one archive of the given format.
    ///
    /// Callers never pass [`CompressionFormat::None`]; passthrough of
    /// individual files is handled upstream by storing each file directly.
    async fn compress(
        &self,
        format: CompressionFormat,
        entries: Vec<(String, ByteStream)>,
    ) -> AppResult<ByteStream>;
}

/// Encrypts an outbound stream before it reaches the blob store.
#[async_trait]
pub trait Encryptor: Send + Sync + std::fmt::Debug {
    /// Encrypt `data` with the key material configured for `task_id`.
    ///
    /// Key resolution is the implementor's concern; the scheduler core
    /// never handles key material.
    async fn encrypt(&self, task_id: TaskId, data: ByteStream) -> AppResult<ByteStream>;
}
