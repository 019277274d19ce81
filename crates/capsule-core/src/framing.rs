use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::status::Status;

/// Maximum length of a request URL in bytes, excluding the CRLF terminator.
pub const MAX_URL_LEN: usize = 1024;

/// Maximum length of a response meta string in bytes.
pub const MAX_META_LEN: usize = 1024;

/// Byte cap for reading a request line: URL plus CR and LF.
pub const REQUEST_LINE_LIMIT: usize = MAX_URL_LEN + 2;

/// Byte cap for reading a response status line: two-digit code, space, meta,
/// CR and LF.
pub const RESPONSE_LINE_LIMIT: usize = 2 + 1 + MAX_META_LEN + 2;

/// MIME type substituted for an empty meta on success responses.
pub const DEFAULT_MIME_TYPE: &str = "text/gemini; charset=utf-8";

#[derive(Debug, Error)]
pub enum LineError {
    #[error("CRLF not found within {limit} bytes")]
    LimitExceeded { limit: usize, partial: Vec<u8> },
    #[error("read failed after {} bytes: {source}", partial.len())]
    Io {
        partial: Vec<u8>,
        #[source]
        source: io::Error,
    },
}

impl LineError {
    /// Bytes accumulated before the failure, for diagnostics.
    pub fn partial(&self) -> &[u8] {
        match self {
            LineError::LimitExceeded { partial, .. } | LineError::Io { partial, .. } => partial,
        }
    }

    /// `true` when the peer closed the stream before a CRLF arrived.
    pub fn is_eof(&self) -> bool {
        matches!(self, LineError::Io { source, .. } if source.kind() == io::ErrorKind::UnexpectedEof)
    }
}

/// Reads a single CRLF-terminated line, one byte at a time, giving up after
/// `limit` bytes. The terminator is only recognised as a `\n` whose
/// immediately preceding byte was `\r`; a bare `\n` is data. The returned
/// bytes exclude the terminator.
pub async fn read_crlf_line<R>(src: &mut R, limit: usize) -> Result<Vec<u8>, LineError>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    let mut previous_was_cr = false;
    for _ in 0..limit {
        let byte = match src.read_u8().await {
            Ok(byte) => byte,
            Err(source) => {
                return Err(LineError::Io {
                    partial: line,
                    source,
                })
            }
        };
        if byte == b'\n' && previous_was_cr {
            line.pop();
            return Ok(line);
        }
        previous_was_cr = byte == b'\r';
        line.push(byte);
    }
    Err(LineError::LimitExceeded {
        limit,
        partial: line,
    })
}

/// Encodes a `<status> <meta>\r\n` header line. An empty meta on a success
/// status becomes [`DEFAULT_MIME_TYPE`]; metas longer than [`MAX_META_LEN`]
/// bytes are truncated on a character boundary.
pub fn encode_header(status: Status, meta: &str) -> Vec<u8> {
    let meta = if meta.is_empty() && status.is_success() {
        DEFAULT_MIME_TYPE
    } else {
        meta
    };
    let meta = truncate_utf8(meta, MAX_META_LEN);
    let mut line = Vec::with_capacity(2 + 1 + meta.len() + 2);
    line.extend_from_slice(status.to_string().as_bytes());
    line.push(b' ');
    line.extend_from_slice(meta.as_bytes());
    line.extend_from_slice(b"\r\n");
    line
}

/// Writes an encoded header line to `dst`, returning the bytes that went on
/// the wire so callers can log them.
pub async fn write_header<W>(dst: &mut W, status: Status, meta: &str) -> io::Result<Vec<u8>>
where
    W: AsyncWrite + Unpin,
{
    let line = encode_header(status, meta);
    dst.write_all(&line).await?;
    Ok(line)
}

fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
