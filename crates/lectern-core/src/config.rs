//! Configuration module
//!
//! Ingestion settings are loaded once at startup, validated, and then shared
//! read-only (usually behind an `Arc`) by every pipeline stage.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

const MB: u64 = 1024 * 1024;

// Common constants
const UPLOAD_DIR: &str = "uploads";
const MAX_FILE_SIZE_MB: u64 = 10;
const MAX_FILENAME_LENGTH: usize = 255;
const QUARANTINE_DIR: &str = "quarantine";
const CLAMAV_HOST: &str = "localhost";
const CLAMAV_PORT: u16 = 3310;
const CLAMAV_TIMEOUT_SECS: u64 = 30;
const IMAGE_MAX_DIMENSION: u32 = 2048;
const IMAGE_QUALITY: u8 = 85;
const THUMBNAIL_SIZES: &str = "150x150,300x300";

const BLOCKED_MIME_TYPES: &str = "application/x-executable,application/x-msdownload,\
application/x-msdos-program,application/x-java-archive,text/x-php,application/x-httpd-php";

const BLOCKED_FILENAME_PATTERNS: &[&str] = &[
    r".*\.(exe|bat|cmd|com|pif|scr|vbs|js|jar|sh)$",
    r".*\.php.*",
    r".*\.jsp.*",
    r".*\.asp.*",
];

/// What to do with a file the scanner reports as infected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirusAction {
    Delete,
    Quarantine,
    Reject,
}

impl FromStr for VirusAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DELETE" => Ok(VirusAction::Delete),
            "QUARANTINE" => Ok(VirusAction::Quarantine),
            "REJECT" => Ok(VirusAction::Reject),
            other => Err(anyhow::anyhow!(
                "Invalid VIRUS_ACTION '{}'. Expected DELETE, QUARANTINE or REJECT",
                other
            )),
        }
    }
}

/// What to do when no scan verdict could be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanErrorPolicy {
    /// Fail the upload.
    Reject,
    /// Accept the upload without a verdict. Trades security for availability.
    Continue,
}

impl FromStr for ScanErrorPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "REJECT" => Ok(ScanErrorPolicy::Reject),
            "CONTINUE" => Ok(ScanErrorPolicy::Continue),
            other => Err(anyhow::anyhow!(
                "Invalid SCAN_ERROR_POLICY '{}'. Expected REJECT or CONTINUE",
                other
            )),
        }
    }
}

/// Allow-lists, size ceiling and processing options for one upload category.
#[derive(Clone, Debug)]
pub struct CategoryProfile {
    pub name: String,
    pub allowed_extensions: Vec<String>,
    pub allowed_mime_types: Vec<String>,
    pub max_file_size: u64,
    /// Directory under the upload root where accepted files land
    pub upload_path: String,
    pub process_images: bool,
    /// When set, a failed base transcode fails the whole upload
    pub require_image_processing: bool,
}

impl CategoryProfile {
    fn builtin(
        name: &str,
        extensions: &[&str],
        mime_types: &[&str],
        max_file_size_mb: u64,
        upload_path: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            allowed_extensions: extensions.iter().map(|s| s.to_string()).collect(),
            allowed_mime_types: mime_types.iter().map(|s| s.to_string()).collect(),
            max_file_size: max_file_size_mb * MB,
            upload_path: upload_path.to_string(),
            process_images: false,
            require_image_processing: false,
        }
    }

    fn with_image_processing(mut self, required: bool) -> Self {
        self.process_images = true;
        self.require_image_processing = required;
        self
    }

    pub fn allows_extension(&self, extension: &str) -> bool {
        let extension = extension.to_lowercase();
        self.allowed_extensions.iter().any(|e| *e == extension)
    }

    pub fn allows_mime_type(&self, mime_type: &str) -> bool {
        let mime_type = mime_type.to_lowercase();
        self.allowed_mime_types.iter().any(|m| *m == mime_type)
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];
const IMAGE_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/bmp", "image/webp"];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt"];
const DOCUMENT_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "text/plain",
];

fn builtin_categories() -> Vec<CategoryProfile> {
    let attachment_extensions: Vec<&str> = DOCUMENT_EXTENSIONS
        .iter()
        .chain(IMAGE_EXTENSIONS.iter())
        .chain(["zip"].iter())
        .copied()
        .collect();
    let attachment_mime_types: Vec<&str> = DOCUMENT_MIME_TYPES
        .iter()
        .chain(IMAGE_MIME_TYPES.iter())
        .chain(["application/zip"].iter())
        .copied()
        .collect();

    vec![
        CategoryProfile::builtin("image", IMAGE_EXTENSIONS, IMAGE_MIME_TYPES, 5, "images")
            .with_image_processing(false),
        CategoryProfile::builtin(
            "document",
            DOCUMENT_EXTENSIONS,
            DOCUMENT_MIME_TYPES,
            10,
            "documents",
        ),
        CategoryProfile::builtin(
            "video",
            &["mp4", "avi", "mov", "wmv", "flv", "webm"],
            &[
                "video/mp4",
                "video/avi",
                "video/quicktime",
                "video/x-ms-wmv",
                "video/x-flv",
                "video/webm",
            ],
            100,
            "videos",
        ),
        CategoryProfile::builtin(
            "audio",
            &["mp3", "wav", "flac", "aac", "ogg"],
            &["audio/mpeg", "audio/wav", "audio/flac", "audio/aac", "audio/ogg"],
            20,
            "audio",
        ),
        CategoryProfile::builtin(
            "archive",
            &["zip", "rar", "7z", "tar", "gz"],
            &[
                "application/zip",
                "application/x-rar-compressed",
                "application/x-7z-compressed",
                "application/x-tar",
                "application/gzip",
            ],
            50,
            "archives",
        ),
        CategoryProfile::builtin(
            "avatar",
            &["jpg", "jpeg", "png", "webp"],
            &["image/jpeg", "image/png", "image/webp"],
            2,
            "avatars",
        )
        .with_image_processing(true),
        CategoryProfile::builtin(
            "attachment",
            &attachment_extensions,
            &attachment_mime_types,
            10,
            "attachments",
        ),
    ]
}

#[derive(Clone, Debug)]
pub struct SecuritySettings {
    pub max_filename_length: usize,
    /// Quarantine directory, relative to the upload root
    pub quarantine_dir: String,
    pub blocked_mime_types: Vec<String>,
    /// Regexes matched against the whole lower-cased filename
    pub blocked_filename_patterns: Vec<String>,
    /// Enables magic-byte signature verification
    pub enable_content_validation: bool,
    pub enable_path_traversal_protection: bool,
}

#[derive(Clone, Debug)]
pub struct VirusScanSettings {
    /// Runs the scan stage at all
    pub enabled: bool,
    /// Talk to the scanning daemon; otherwise use the pattern fallback
    pub daemon_enabled: bool,
    pub host: String,
    pub port: u16,
    pub timeout_secs: u64,
    pub action: VirusAction,
    pub on_error: ScanErrorPolicy,
    /// Use the pattern fallback when the daemon cannot be reached
    pub fallback_on_unavailable: bool,
}

#[derive(Clone, Debug)]
pub struct ImageProcessingSettings {
    pub resize_enabled: bool,
    pub strip_metadata: bool,
    pub thumbnails_enabled: bool,
    pub max_width: u32,
    pub max_height: u32,
    /// Lossy encoder quality, 0-100
    pub quality: u8,
    /// `WxH` tokens
    pub thumbnail_sizes: Vec<String>,
}

impl ImageProcessingSettings {
    pub fn any_enabled(&self) -> bool {
        self.resize_enabled || self.strip_metadata || self.thumbnails_enabled
    }
}

/// File ingestion configuration
#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub upload_dir: PathBuf,
    pub environment: String,
    pub categories: HashMap<String, CategoryProfile>,
    pub security: SecuritySettings,
    pub virus_scan: VirusScanSettings,
    pub image: ImageProcessingSettings,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let categories = builtin_categories()
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();

        Self {
            upload_dir: PathBuf::from(UPLOAD_DIR),
            environment: "development".to_string(),
            categories,
            security: SecuritySettings {
                max_filename_length: MAX_FILENAME_LENGTH,
                quarantine_dir: QUARANTINE_DIR.to_string(),
                blocked_mime_types: split_list(BLOCKED_MIME_TYPES),
                blocked_filename_patterns: BLOCKED_FILENAME_PATTERNS
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                enable_content_validation: true,
                enable_path_traversal_protection: true,
            },
            virus_scan: VirusScanSettings {
                enabled: true,
                daemon_enabled: false,
                host: CLAMAV_HOST.to_string(),
                port: CLAMAV_PORT,
                timeout_secs: CLAMAV_TIMEOUT_SECS,
                action: VirusAction::Quarantine,
                on_error: ScanErrorPolicy::Continue,
                fallback_on_unavailable: true,
            },
            image: ImageProcessingSettings {
                resize_enabled: true,
                strip_metadata: true,
                thumbnails_enabled: true,
                max_width: IMAGE_MAX_DIMENSION,
                max_height: IMAGE_MAX_DIMENSION,
                quality: IMAGE_QUALITY,
                thumbnail_sizes: split_list(THUMBNAIL_SIZES),
            },
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

impl IngestConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let mut config = IngestConfig::default();

        config.environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());
        let is_production = matches!(
            config.environment.to_lowercase().as_str(),
            "production" | "prod"
        );

        if let Ok(dir) = env::var("UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(dir);
        }

        let fallback_max_mb: u64 = env_parse("MAX_FILE_SIZE_MB", MAX_FILE_SIZE_MB);
        for profile in config.categories.values_mut() {
            let prefix = profile.name.to_uppercase();
            if let Ok(list) = env::var(format!("{}_ALLOWED_EXTENSIONS", prefix)) {
                profile.allowed_extensions = split_list(&list);
            }
            if let Ok(list) = env::var(format!("{}_ALLOWED_MIME_TYPES", prefix)) {
                profile.allowed_mime_types = split_list(&list);
            }
            let default_mb = profile.max_file_size / MB;
            let max_mb = env_parse(
                &format!("{}_MAX_FILE_SIZE_MB", prefix),
                if default_mb == 0 { fallback_max_mb } else { default_mb },
            );
            profile.max_file_size = max_mb * MB;
        }

        let security = &mut config.security;
        security.max_filename_length = env_parse("MAX_FILENAME_LENGTH", MAX_FILENAME_LENGTH);
        security.quarantine_dir =
            env::var("QUARANTINE_DIR").unwrap_or_else(|_| QUARANTINE_DIR.to_string());
        security.blocked_mime_types = split_list(
            &env::var("BLOCKED_MIME_TYPES").unwrap_or_else(|_| BLOCKED_MIME_TYPES.to_string()),
        );
        if let Ok(patterns) = env::var("BLOCKED_FILENAME_PATTERNS") {
            security.blocked_filename_patterns = patterns
                .split(';')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        security.enable_content_validation = env_bool("ENABLE_CONTENT_VALIDATION", true);
        security.enable_path_traversal_protection =
            env_bool("ENABLE_PATH_TRAVERSAL_PROTECTION", true);

        let scan = &mut config.virus_scan;
        scan.enabled = env_bool("VIRUS_SCAN_ENABLED", true);
        scan.daemon_enabled = env_bool("CLAMAV_ENABLED", false);
        scan.host = env::var("CLAMAV_HOST").unwrap_or_else(|_| CLAMAV_HOST.to_string());
        scan.port = env_parse("CLAMAV_PORT", CLAMAV_PORT);
        scan.timeout_secs = env_parse("CLAMAV_TIMEOUT_SECS", CLAMAV_TIMEOUT_SECS);
        scan.fallback_on_unavailable = env_bool("CLAMAV_FALLBACK_ON_UNAVAILABLE", true);
        scan.action = match env::var("VIRUS_ACTION") {
            Ok(value) => value.parse()?,
            Err(_) => VirusAction::Quarantine,
        };
        scan.on_error = match env::var("SCAN_ERROR_POLICY") {
            Ok(value) => value.parse()?,
            Err(_) if is_production => ScanErrorPolicy::Reject,
            Err(_) => ScanErrorPolicy::Continue,
        };

        let image = &mut config.image;
        image.resize_enabled = env_bool("IMAGE_RESIZE_ENABLED", true);
        image.strip_metadata = env_bool("IMAGE_STRIP_METADATA", true);
        image.thumbnails_enabled = env_bool("IMAGE_THUMBNAILS_ENABLED", true);
        image.max_width = env_parse("IMAGE_MAX_WIDTH", IMAGE_MAX_DIMENSION);
        image.max_height = env_parse("IMAGE_MAX_HEIGHT", IMAGE_MAX_DIMENSION);
        image.quality = env_parse("IMAGE_QUALITY", IMAGE_QUALITY);
        image.thumbnail_sizes = split_list(
            &env::var("THUMBNAIL_SIZES").unwrap_or_else(|_| THUMBNAIL_SIZES.to_string()),
        );

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.upload_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("UPLOAD_DIR cannot be empty"));
        }
        if self.categories.is_empty() {
            return Err(anyhow::anyhow!("At least one upload category must be configured"));
        }
        for profile in self.categories.values() {
            if profile.max_file_size == 0 {
                return Err(anyhow::anyhow!(
                    "Maximum file size for category '{}' must be greater than 0",
                    profile.name
                ));
            }
            if profile.upload_path.contains("..") || profile.upload_path.starts_with('/') {
                return Err(anyhow::anyhow!(
                    "Upload path for category '{}' must be a relative path inside UPLOAD_DIR",
                    profile.name
                ));
            }
        }
        if self.security.max_filename_length == 0 {
            return Err(anyhow::anyhow!("MAX_FILENAME_LENGTH must be greater than 0"));
        }
        let quarantine_dir = &self.security.quarantine_dir;
        if quarantine_dir.is_empty()
            || quarantine_dir.contains("..")
            || quarantine_dir.starts_with('/')
            || quarantine_dir.starts_with('\\')
            || std::path::Path::new(quarantine_dir).is_absolute()
        {
            return Err(anyhow::anyhow!("QUARANTINE_DIR must stay inside UPLOAD_DIR"));
        }
        for pattern in &self.security.blocked_filename_patterns {
            regex::Regex::new(pattern).map_err(|e| {
                anyhow::anyhow!("Invalid blocked filename pattern '{}': {}", pattern, e)
            })?;
        }
        if self.virus_scan.enabled && self.virus_scan.timeout_secs == 0 {
            return Err(anyhow::anyhow!("CLAMAV_TIMEOUT_SECS must be greater than 0"));
        }
        if self.image.quality > 100 {
            return Err(anyhow::anyhow!(
                "IMAGE_QUALITY must be between 0 and 100, got {}",
                self.image.quality
            ));
        }
        if self.image.max_width == 0 || self.image.max_height == 0 {
            return Err(anyhow::anyhow!(
                "IMAGE_MAX_WIDTH and IMAGE_MAX_HEIGHT must be greater than 0"
            ));
        }
        Ok(())
    }

    pub fn category(&self, name: &str) -> Option<&CategoryProfile> {
        self.categories.get(&name.to_lowercase())
    }

    /// Upload sub-directory for a category; unknown categories land in `misc`.
    pub fn upload_path(&self, category: &str) -> &str {
        self.category(category)
            .map(|c| c.upload_path.as_str())
            .unwrap_or("misc")
    }

    pub fn quarantine_path(&self) -> PathBuf {
        self.upload_dir.join(&self.security.quarantine_dir)
    }

    pub fn staging_path(&self) -> PathBuf {
        self.upload_dir.join(".staging")
    }

    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "production" | "prod")
    }
}
