//! Magic-byte verification of declared content types.

use lectern_core::{IngestError, IngestResult};
use std::collections::HashMap;
use std::sync::Arc;

use crate::validator::normalize_mime_type;

const MIN_PEEK_LEN: usize = 16;

const ZIP_LOCAL: &[u8] = &[0x50, 0x4B, 0x03, 0x04];
const ZIP_EMPTY: &[u8] = &[0x50, 0x4B, 0x05, 0x06];
const ZIP_SPANNED: &[u8] = &[0x50, 0x4B, 0x07, 0x08];
const OLE_COMPOUND: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Immutable table of content type to accepted byte prefixes.
///
/// Built once at startup and shared by reference; nothing mutates it afterwards.
#[derive(Debug, Clone)]
pub struct SignatureRegistry {
    signatures: HashMap<String, Vec<Vec<u8>>>,
}

impl SignatureRegistry {
    pub fn new(signatures: HashMap<String, Vec<Vec<u8>>>) -> Self {
        Self { signatures }
    }

    pub fn builtin() -> Self {
        let entries: &[(&str, &[&[u8]])] = &[
            ("image/jpeg", &[&[0xFF, 0xD8, 0xFF]]),
            ("image/png", &[&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]]),
            ("image/gif", &[b"GIF87a", b"GIF89a"]),
            ("image/bmp", &[b"BM"]),
            ("image/webp", &[b"RIFF"]),
            ("application/pdf", &[b"%PDF"]),
            ("application/msword", &[OLE_COMPOUND]),
            ("application/vnd.ms-excel", &[OLE_COMPOUND]),
            ("application/vnd.ms-powerpoint", &[OLE_COMPOUND]),
            (
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                &[ZIP_LOCAL],
            ),
            (
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                &[ZIP_LOCAL],
            ),
            (
                "application/vnd.openxmlformats-officedocument.presentationml.presentation",
                &[ZIP_LOCAL],
            ),
            ("application/zip", &[ZIP_LOCAL, ZIP_EMPTY, ZIP_SPANNED]),
            ("application/gzip", &[&[0x1F, 0x8B]]),
            ("application/x-7z-compressed", &[&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C]]),
            ("application/x-rar-compressed", &[b"Rar!\x1a\x07"]),
        ];

        let signatures = entries
            .iter()
            .map(|(mime, sigs)| {
                (
                    mime.to_string(),
                    sigs.iter().map(|s| s.to_vec()).collect::<Vec<_>>(),
                )
            })
            .collect();
        Self::new(signatures)
    }

    pub fn signatures_for(&self, content_type: &str) -> Option<&[Vec<u8>]> {
        self.signatures
            .get(&normalize_mime_type(content_type))
            .map(|s| s.as_slice())
    }

    /// Bytes needed to verify any registered type.
    pub fn peek_len(&self) -> usize {
        self.signatures
            .values()
            .flatten()
            .map(|s| s.len())
            .max()
            .unwrap_or(0)
            .max(MIN_PEEK_LEN)
    }
}

impl Default for SignatureRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Confirms leading bytes match a signature registered for the declared type.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    registry: Arc<SignatureRegistry>,
}

impl SignatureVerifier {
    pub fn new(registry: Arc<SignatureRegistry>) -> Self {
        Self { registry }
    }

    pub fn peek_len(&self) -> usize {
        self.registry.peek_len()
    }

    /// Types without a registered signature are not enforced and pass.
    pub fn verify(&self, header: &[u8], content_type: &str) -> IngestResult<()> {
        let Some(signatures) = self.registry.signatures_for(content_type) else {
            tracing::debug!(
                content_type = %content_type,
                "No signature registered, skipping magic-byte check"
            );
            return Ok(());
        };

        let header = &header[..header.len().min(self.peek_len())];
        if signatures.iter().any(|sig| header.starts_with(sig)) {
            return Ok(());
        }

        Err(IngestError::SignatureMismatch(normalize_mime_type(content_type)))
    }
}
