use lectern_core::{CategoryProfile, IngestError, IngestResult};

/// Strip parameters (`; charset=...`) and lower-case a MIME type.
pub fn normalize_mime_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_lowercase()
}

/// Cross-checks the declared MIME type against the global deny-list and the
/// category allow-list. Never looks at content bytes.
#[derive(Debug, Clone)]
pub struct ContentTypeGuard {
    blocked_mime_types: Vec<String>,
}

impl ContentTypeGuard {
    pub fn new(blocked_mime_types: Vec<String>) -> Self {
        Self {
            blocked_mime_types: blocked_mime_types
                .iter()
                .map(|m| normalize_mime_type(m))
                .collect(),
        }
    }

    pub fn check(&self, content_type: &str, category: &CategoryProfile) -> IngestResult<()> {
        let normalized = normalize_mime_type(content_type);

        if self.blocked_mime_types.iter().any(|m| *m == normalized) {
            return Err(IngestError::BlockedMimeType(normalized));
        }

        if !category.allows_mime_type(&normalized) {
            return Err(IngestError::DisallowedForCategory {
                content_type: normalized,
                category: category.name.clone(),
            });
        }

        Ok(())
    }
}
