//! clamd wire protocol.
//!
//! Commands use the `z` prefix and are NUL-terminated. `INSTREAM` bodies are
//! sent as length-prefixed chunks (4-byte big-endian length) and closed with a
//! zero-length chunk. Replies are a single line.

use bytes::{BufMut, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const PING: &[u8] = b"zPING\0";
pub const INSTREAM: &[u8] = b"zINSTREAM\0";
pub const PONG: &str = "PONG";

pub const CHUNK_SIZE: usize = 8192;
const MAX_REPLY_LEN: usize = 4096;

const FOUND_MARKER: &str = "FOUND";
const CLEAN_MARKER: &str = "OK";

/// Classification of a single clamd reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    Infected(String),
    Error(String),
}

/// `<u32 BE length><bytes>`
pub fn encode_chunk(chunk: &[u8]) -> BytesMut {
    let mut frame = BytesMut::with_capacity(4 + chunk.len());
    frame.put_u32(chunk.len() as u32);
    frame.put_slice(chunk);
    frame
}

/// Zero-length chunk terminating an `INSTREAM` body.
pub fn end_of_stream() -> [u8; 4] {
    0u32.to_be_bytes()
}

/// Classify a reply such as `stream: OK` or `stream: Eicar-Signature FOUND`.
/// Anything without a definitive marker is an error, never a verdict.
pub fn parse_response(reply: &str) -> ScanVerdict {
    let reply = reply.trim_matches(|c: char| c == '\0' || c.is_whitespace());

    if let Some(head) = reply.strip_suffix(FOUND_MARKER) {
        let name = match head.split_once(':') {
            Some((_, name)) => name.trim(),
            None => head.trim(),
        };
        let name = if name.is_empty() { "Unknown" } else { name };
        return ScanVerdict::Infected(name.to_string());
    }

    if let Some(head) = reply.strip_suffix(CLEAN_MARKER) {
        if head.trim_end().ends_with(':') {
            return ScanVerdict::Clean;
        }
    }

    if reply.is_empty() {
        return ScanVerdict::Error("empty reply from scan daemon".to_string());
    }
    ScanVerdict::Error(reply.to_string())
}

/// Read one reply, up to NUL, newline or EOF.
pub async fn read_reply<S>(stream: &mut S) -> io::Result<String>
where
    S: AsyncRead + Unpin,
{
    let mut reply = Vec::with_capacity(64);
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 || byte[0] == b'\0' || byte[0] == b'\n' {
            break;
        }
        reply.push(byte[0]);
        if reply.len() >= MAX_REPLY_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "scan daemon reply too long",
            ));
        }
    }
    Ok(String::from_utf8_lossy(&reply).trim().to_string())
}

/// Send `PING` and report whether the daemon answered `PONG`.
pub async fn ping<S>(stream: &mut S) -> io::Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(PING).await?;
    stream.flush().await?;
    Ok(read_reply(stream).await? == PONG)
}

/// Stream `source` with `INSTREAM` and return the raw reply line.
pub async fn instream<S, R>(stream: &mut S, source: &mut R) -> io::Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    stream.write_all(INSTREAM).await?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        stream.write_all(&encode_chunk(&buf[..n])).await?;
    }
    stream.write_all(&end_of_stream()).await?;
    stream.flush().await?;

    read_reply(stream).await
}
