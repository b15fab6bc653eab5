//! Line-delimited JSON wire codec
//!
//! Each message is one JSON document terminated by `\n`:
//! ```text
//! {"jsonrpc":"2.0","id":1,"method":"tools/list","params":{}}\n
//! ```

use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Read one line from the stream
///
/// Bytes accumulate in `buf` until a newline or end-of-file, so a read
/// interrupted by a deadline resumes where it stopped on the next call.
/// Returns `None` only when the stream is closed and nothing is pending;
/// an empty line comes back as an empty vector. The line is returned as
/// raw bytes without its terminator; decoding is up to the caller.
pub async fn read_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> io::Result<Option<Vec<u8>>> {
    let bytes_read = reader.read_until(b'\n', buf).await?;

    if bytes_read == 0 && buf.is_empty() {
        return Ok(None);
    }

    let mut raw = std::mem::take(buf);
    if raw.last() == Some(&b'\n') {
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
    }

    Ok(Some(raw))
}

/// Write one line to the stream
///
/// Appends the terminator and flushes so the peer sees the message
/// immediately. The payload itself must not contain a newline.
pub async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> io::Result<()> {
    if line.contains('\n') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "message contains an embedded newline",
        ));
    }

    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    Ok(())
}
