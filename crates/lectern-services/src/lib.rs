//! Lectern Services Library
//!
//! I/O-bound stages of file ingestion and the orchestrator that sequences
//! them: virus scanning, infected-file disposition and the ingestion pipeline.

pub mod disposition;
pub mod ingest;
pub mod virus_scan;

pub use disposition::DispositionHandler;
pub use ingest::IngestionPipeline;
pub use virus_scan::{FallbackScanner, ScanVerdict, VirusScanClient, VirusScanner};
