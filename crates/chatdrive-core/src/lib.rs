//! # chatdrive-core
//!
//! Core crate for Chatdrive. Contains the unified error system, typed
//! identifiers, configuration schemas, the backup domain model, and the
//! collaborator traits (task store, transfer client, compressor,
//! encryptor, blob store) implemented elsewhere in the product.
//!
//! This crate has **no** internal dependencies on other Chatdrive crates.

pub mod config;
pub mod error;
pub mod model;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
