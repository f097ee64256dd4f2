//! Lectern Processing Library
//!
//! CPU-bound stages of file ingestion: declared-metadata validation,
//! magic-byte verification, content heuristics and image transcoding.

pub mod heuristics;
pub mod image;
pub mod security;
pub mod signature;
pub mod stream;
pub mod validator;

pub use heuristics::{HeuristicContentScanner, HEURISTIC_WINDOW};
pub use image::{ImageTranscoder, OutputFormat, ThumbnailSize};
pub use security::SecurityChain;
pub use signature::{SignatureRegistry, SignatureVerifier};
pub use stream::{peek_prefix, PeekedStream};
pub use validator::{
    guess_content_type, normalize_mime_type, sanitize_filename, unique_filename,
    ContentTypeGuard, FilenameValidator, PathTraversalGuard, UploadValidator,
};
