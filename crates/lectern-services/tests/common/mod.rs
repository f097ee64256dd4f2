#![allow(dead_code)]

use lectern_core::{IngestConfig, ScanErrorPolicy, UploadRequest, VirusAction};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// How the fake clamd answers an `INSTREAM` request.
#[derive(Debug, Clone, Copy)]
pub enum DaemonMode {
    Clean,
    Infected(&'static str),
    /// Answers PING but never replies to a scan.
    Hang,
}

/// In-process stand-in for clamd on a random local port.
pub struct FakeDaemon {
    pub port: u16,
    scans: Arc<AtomicUsize>,
}

impl FakeDaemon {
    pub async fn start(mode: DaemonMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let scans = Arc::new(AtomicUsize::new(0));

        let counter = scans.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, mode, counter.clone()));
            }
        });

        Self { port, scans }
    }

    /// Number of `INSTREAM` requests received.
    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

async fn serve(mut socket: TcpStream, mode: DaemonMode, scans: Arc<AtomicUsize>) {
    let mut command = Vec::new();
    let mut byte = [0u8; 1];
    while socket.read(&mut byte).await.unwrap_or(0) == 1 && byte[0] != 0 {
        command.push(byte[0]);
    }

    match command.as_slice() {
        b"zPING" => {
            let _ = socket.write_all(b"PONG\0").await;
        }
        b"zINSTREAM" => {
            scans.fetch_add(1, Ordering::SeqCst);
            loop {
                let len = match socket.read_u32().await {
                    Ok(len) => len as usize,
                    Err(_) => return,
                };
                if len == 0 {
                    break;
                }
                let mut chunk = vec![0u8; len];
                if socket.read_exact(&mut chunk).await.is_err() {
                    return;
                }
            }
            let reply = match mode {
                DaemonMode::Clean => "stream: OK".to_string(),
                DaemonMode::Infected(name) => format!("stream: {} FOUND", name),
                DaemonMode::Hang => {
                    tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                    return;
                }
            };
            let _ = socket.write_all(format!("{}\0", reply).as_bytes()).await;
        }
        _ => {
            let _ = socket.write_all(b"UNKNOWN COMMAND\0").await;
        }
    }
}

/// Defaults pointed at `upload_dir` and a fake daemon, rejecting on scan errors.
pub fn config(upload_dir: &Path, daemon_port: u16) -> IngestConfig {
    let mut config = IngestConfig::default();
    config.upload_dir = upload_dir.to_path_buf();
    config.virus_scan.enabled = true;
    config.virus_scan.daemon_enabled = true;
    config.virus_scan.host = "127.0.0.1".to_string();
    config.virus_scan.port = daemon_port;
    config.virus_scan.timeout_secs = 1;
    config.virus_scan.fallback_on_unavailable = false;
    config.virus_scan.on_error = ScanErrorPolicy::Reject;
    config.virus_scan.action = VirusAction::Quarantine;
    config
}

pub fn request(
    filename: &str,
    content_type: &str,
    category: &str,
    body: Vec<u8>,
) -> UploadRequest<Cursor<Vec<u8>>> {
    let size = body.len() as u64;
    UploadRequest::new(filename, content_type, size, category, Cursor::new(body))
}

/// Every regular file under `dir`, recursively.
pub fn files_under(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return files;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            files.extend(files_under(&path));
        } else {
            files.push(path);
        }
    }
    files
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}
