//! The pre-scan validation chain.

use lectern_core::{
    CategoryProfile, IngestConfig, IngestError, IngestResult, SecurityIssue, SecuritySettings,
    SecurityVerdict,
};
use std::sync::Arc;

use crate::heuristics::{HeuristicContentScanner, HEURISTIC_WINDOW};
use crate::signature::{SignatureRegistry, SignatureVerifier};
use crate::validator::{ContentTypeGuard, FilenameValidator, PathTraversalGuard, UploadValidator};

/// Runs every declared-metadata and header check in a fixed order.
///
/// Filename, content type and path traversal come first. Blocked filename
/// patterns and the extension checks run after the traversal guard so a
/// `../x.php` name is always reported as traversal.
pub struct SecurityChain {
    filenames: FilenameValidator,
    content_types: ContentTypeGuard,
    traversal: PathTraversalGuard,
    signatures: SignatureVerifier,
    heuristics: HeuristicContentScanner,
    enable_content_validation: bool,
    enable_path_traversal_protection: bool,
}

impl SecurityChain {
    pub fn new(settings: &SecuritySettings, registry: Arc<SignatureRegistry>) -> Result<Self, regex::Error> {
        Ok(Self {
            filenames: FilenameValidator::from_settings(settings)?,
            content_types: ContentTypeGuard::new(settings.blocked_mime_types.clone()),
            traversal: PathTraversalGuard,
            signatures: SignatureVerifier::new(registry),
            heuristics: HeuristicContentScanner,
            enable_content_validation: settings.enable_content_validation,
            enable_path_traversal_protection: settings.enable_path_traversal_protection,
        })
    }

    pub fn from_config(config: &IngestConfig) -> Result<Self, regex::Error> {
        Self::new(&config.security, Arc::new(SignatureRegistry::builtin()))
    }

    /// Bytes of the stream both content checks need.
    pub fn header_len(&self) -> usize {
        HEURISTIC_WINDOW.max(self.signatures.peek_len())
    }

    pub fn heuristics(&self) -> &HeuristicContentScanner {
        &self.heuristics
    }

    /// Checks on declared metadata only. Stops at the first failure.
    pub fn check_declared(
        &self,
        filename: &str,
        content_type: &str,
        declared_size: u64,
        category: &CategoryProfile,
    ) -> IngestResult<()> {
        self.declared_steps(filename, content_type, declared_size, category)
            .into_iter()
            .try_for_each(|step| step())
    }

    /// Signature and heuristic checks over the peeked header.
    pub fn check_content(&self, header: &[u8], content_type: &str) -> IngestResult<()> {
        if self.enable_content_validation {
            self.signatures.verify(header, content_type)?;
        }
        self.heuristics.scan(header, content_type)
    }

    /// Runs every check without stopping and collects all failures.
    pub fn evaluate(
        &self,
        filename: &str,
        content_type: &str,
        declared_size: u64,
        category: &CategoryProfile,
        header: &[u8],
    ) -> SecurityVerdict {
        let mut issues: Vec<SecurityIssue> = self
            .declared_steps(filename, content_type, declared_size, category)
            .into_iter()
            .filter_map(|step| step().err())
            .map(|err| SecurityIssue::from(&err))
            .collect();

        if self.enable_content_validation {
            if let Err(err) = self.signatures.verify(header, content_type) {
                issues.push(SecurityIssue::from(&err));
            }
        }
        if let Err(err) = self.heuristics.scan(header, content_type) {
            issues.push(SecurityIssue::from(&err));
        }

        SecurityVerdict::from_issues(issues)
    }

    fn declared_steps<'a>(
        &'a self,
        filename: &'a str,
        content_type: &'a str,
        declared_size: u64,
        category: &'a CategoryProfile,
    ) -> Vec<Box<dyn Fn() -> IngestResult<()> + 'a>> {
        let mut steps: Vec<Box<dyn Fn() -> IngestResult<()> + 'a>> = vec![
            Box::new(move || self.filenames.validate(filename)),
            Box::new(move || self.content_types.check(content_type, category)),
        ];
        if self.enable_path_traversal_protection {
            steps.push(Box::new(move || self.traversal.check(filename)));
        }
        steps.push(Box::new(move || self.filenames.check_blocked_patterns(filename)));
        steps.push(Box::new(move || {
            UploadValidator::new(category).validate_all(filename, content_type, declared_size)
        }));
        steps
    }
}

/// Resolve a category key or fail with `UnknownCategory`.
pub fn resolve_category<'a>(config: &'a IngestConfig, category: &str) -> IngestResult<&'a CategoryProfile> {
    config
        .category(category)
        .ok_or_else(|| IngestError::UnknownCategory(category.to_string()))
}
