use lectern_processing::guess_content_type;
use std::path::Path;

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Declared name for a local file: its final path component.
pub fn upload_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Explicit content type if given, otherwise guessed from the extension.
pub fn resolve_content_type(explicit: Option<&str>, filename: &str) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| guess_content_type(filename).map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string())
}
