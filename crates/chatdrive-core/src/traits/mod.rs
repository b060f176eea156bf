//! Collaborator contracts consumed by the backup scheduler core.
//!
//! The traits are defined here in `chatdrive-core` and implemented by the
//! product's transfer, archive, and storage crates. All of them are
//! in-process calls within a single scheduler instance, not a network
//! protocol.

pub mod archive;
pub mod blob;
pub mod store;
pub mod transfer;

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;

pub use archive::{Compressor, Encryptor};
pub use blob::{BlobStore, StoredArchive};
pub use store::TaskStore;
pub use transfer::{RemoteEntry, TransferClient, TransferSession};

/// A byte stream type used for moving file contents between collaborators.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;
