//! Lectern Storage Library
//!
//! Filesystem layout for ingestion: a private staging area that cleans up
//! after itself, and the per-category directories accepted files are
//! promoted into.

pub mod error;
pub mod local;
pub mod staging;

pub use error::{StorageError, StorageResult};
pub use local::{StoredFile, UploadStore};
pub use staging::{StagedUpload, StagingArea};
