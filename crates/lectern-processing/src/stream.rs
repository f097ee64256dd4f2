//! Peeking at the head of an upload without losing it.

use bytes::Bytes;
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncReadExt, Chain};

/// A stream whose first bytes have already been read into `header`.
/// Reading from it yields the header again followed by the rest of the source.
pub type PeekedStream<R> = Chain<Cursor<Bytes>, R>;

/// Read up to `len` bytes from `reader` and hand back both the bytes and a
/// stream that replays them. Short sources yield a shorter header.
pub async fn peek_prefix<R>(mut reader: R, len: usize) -> std::io::Result<(Bytes, PeekedStream<R>)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);

    let header = Bytes::from(buf);
    let replay = Cursor::new(header.clone()).chain(reader);
    Ok((header, replay))
}
