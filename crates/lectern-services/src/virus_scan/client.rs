use async_trait::async_trait;
use chrono::Utc;
use lectern_core::{ScanMethod, ScanResult, ThreatLevel, VirusScanSettings};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

use super::fallback::FallbackScanner;
use super::protocol::{self, ScanVerdict};
use super::VirusScanner;

/// Scans staged files with clamd over TCP, falling back to
/// [`FallbackScanner`] when configured to.
#[derive(Debug, Clone)]
pub struct VirusScanClient {
    settings: VirusScanSettings,
    fallback: FallbackScanner,
}

impl VirusScanClient {
    pub fn new(settings: VirusScanSettings) -> Self {
        Self {
            settings,
            fallback: FallbackScanner,
        }
    }

    pub fn settings(&self) -> &VirusScanSettings {
        &self.settings
    }

    fn address(&self) -> String {
        format!("{}:{}", self.settings.host, self.settings.port)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.settings.timeout_secs)
    }

    /// `PING` on a fresh connection. False when daemon mode is off, the
    /// connection fails, or no `PONG` arrives within the timeout.
    pub async fn is_daemon_available(&self) -> bool {
        if !self.settings.daemon_enabled {
            return false;
        }

        let address = self.address();
        let exchange = async {
            let mut stream = TcpStream::connect(&address).await?;
            protocol::ping(&mut stream).await
        };

        match tokio::time::timeout(self.timeout(), exchange).await {
            Ok(Ok(true)) => true,
            Ok(Ok(false)) => {
                tracing::warn!(address = %address, "Scan daemon answered PING without PONG");
                false
            }
            Ok(Err(e)) => {
                tracing::debug!(address = %address, error = %e, "Scan daemon not reachable");
                false
            }
            Err(_) => {
                tracing::debug!(address = %address, "Scan daemon PING timed out");
                false
            }
        }
    }

    /// Stream the file to clamd with `INSTREAM`. The whole exchange is bounded
    /// by the configured timeout.
    pub async fn scan_with_daemon(&self, path: &Path) -> ScanResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let address = self.address();
        let timeout_secs = self.settings.timeout_secs;

        tracing::debug!(address = %address, "Starting daemon scan");

        let exchange = async {
            let mut file = tokio::fs::File::open(path).await?;
            let mut stream = TcpStream::connect(&address).await?;
            protocol::instream(&mut stream, &mut file).await
        };

        let reply = match tokio::time::timeout(self.timeout(), exchange).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                tracing::error!(address = %address, error = %e, "Daemon scan failed");
                return ScanResult::failed(
                    ScanMethod::Daemon,
                    format!("scan daemon error: {}", e),
                    started_at,
                );
            }
            Err(_) => {
                tracing::error!(
                    address = %address,
                    timeout_secs = timeout_secs,
                    "Daemon scan timed out"
                );
                return ScanResult::failed(
                    ScanMethod::Daemon,
                    format!("scan timed out after {} seconds", timeout_secs),
                    started_at,
                );
            }
        };

        match protocol::parse_response(&reply) {
            ScanVerdict::Clean => {
                tracing::info!(
                    duration_ms = start.elapsed().as_millis() as u64,
                    "File scan completed: clean"
                );
                ScanResult::clean(ScanMethod::Daemon, reply, started_at)
            }
            ScanVerdict::Infected(name) => {
                tracing::warn!(
                    duration_ms = start.elapsed().as_millis() as u64,
                    virus = %name,
                    "File scan detected virus"
                );
                ScanResult::infected(ScanMethod::Daemon, name, ThreatLevel::High, reply, started_at)
            }
            ScanVerdict::Error(message) => {
                tracing::error!(reply = %message, "Scan daemon returned an error");
                ScanResult::failed(
                    ScanMethod::Daemon,
                    format!("scan daemon error: {}", message),
                    started_at,
                )
            }
        }
    }

    async fn scan_with_fallback(&self, path: &Path) -> ScanResult {
        let started_at = Utc::now();
        match self.fallback.scan_file(path).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Fallback scan could not read the staged file");
                ScanResult::failed(ScanMethod::Fallback, e.to_string(), started_at)
            }
        }
    }
}

#[async_trait]
impl VirusScanner for VirusScanClient {
    async fn scan_file(&self, path: &Path) -> ScanResult {
        if !self.settings.enabled {
            tracing::debug!("Virus scanning disabled, skipping");
            return ScanResult::skipped();
        }

        if !self.settings.daemon_enabled {
            return self.scan_with_fallback(path).await;
        }

        if self.is_daemon_available().await {
            return self.scan_with_daemon(path).await;
        }

        if self.settings.fallback_on_unavailable {
            tracing::warn!(
                address = %self.address(),
                "Scan daemon unavailable, using advisory pattern scan"
            );
            return self.scan_with_fallback(path).await;
        }

        tracing::error!(address = %self.address(), "Scan daemon unavailable");
        ScanResult::failed(
            ScanMethod::Daemon,
            format!("scan daemon unavailable at {}", self.address()),
            Utc::now(),
        )
    }
}
