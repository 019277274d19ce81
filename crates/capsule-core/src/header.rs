use std::fmt;

use thiserror::Error;

use crate::framing::{encode_header, MAX_META_LEN};
use crate::status::{InvalidStatus, Status};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("status line is not valid UTF-8")]
    NotUtf8,
    #[error("invalid status code: {0}")]
    InvalidStatus(#[from] InvalidStatus),
    #[error("meta is longer than {MAX_META_LEN} bytes")]
    MetaTooLong,
}

/// Parsed response header: a status code plus the free-form meta string that
/// follows it (a MIME type on success, a prompt on input, a target on
/// redirect, a reason on failure).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub status: Status,
    pub meta: String,
}

impl Header {
    pub fn new(status: Status, meta: impl Into<String>) -> Result<Header, HeaderError> {
        let meta = meta.into();
        if meta.len() > MAX_META_LEN {
            return Err(HeaderError::MetaTooLong);
        }
        Ok(Header { status, meta })
    }

    /// Parses a status line. Any trailing CR/LF bytes are ignored. Sparse
    /// servers answer errors with a bare `<status>` and no space, so a
    /// one-token line is accepted with an empty meta; emission always uses
    /// the two-token form.
    pub fn parse(line: &[u8]) -> Result<Header, HeaderError> {
        let line = std::str::from_utf8(line).map_err(|_| HeaderError::NotUtf8)?;
        let line = line.trim_end_matches(['\r', '\n']);
        let (code, meta) = match line.split_once(' ') {
            Some((code, meta)) => (code, meta),
            None => (line, ""),
        };
        let status: Status = code.parse()?;
        if meta.len() > MAX_META_LEN {
            return Err(HeaderError::MetaTooLong);
        }
        Ok(Header {
            status,
            meta: meta.to_string(),
        })
    }

    /// Encodes the header as a `<status> <meta>\r\n` wire line.
    pub fn encode(&self) -> Vec<u8> {
        encode_header(self.status, &self.meta)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_two_token_line() {
        let header = Header::parse(b"20 text/gemini; charset=utf-8").expect("header");
        assert_eq!(header.status, Status::SUCCESS);
        assert_eq!(header.meta, "text/gemini; charset=utf-8");
    }

    #[test]
    fn parses_a_bare_status() {
        let header = Header::parse(b"51").expect("header");
        assert_eq!(header.status, Status::NOT_FOUND);
        assert_eq!(header.meta, "");
    }

    #[test]
    fn accepts_a_trailing_space() {
        let header = Header::parse(b"51 \r\n").expect("header");
        assert_eq!(header.status, Status::NOT_FOUND);
        assert_eq!(header.meta, "");
    }

    #[test]
    fn rejects_bad_codes() {
        assert!(matches!(
            Header::parse(b"7a nope"),
            Err(HeaderError::InvalidStatus(_))
        ));
        assert!(matches!(
            Header::parse(b"99 nope"),
            Err(HeaderError::InvalidStatus(_))
        ));
        assert!(matches!(Header::parse(b""), Err(HeaderError::InvalidStatus(_))));
    }

    #[test]
    fn rejects_oversized_meta() {
        let line = format!("20 {}", "a".repeat(MAX_META_LEN + 1));
        assert_eq!(Header::parse(line.as_bytes()), Err(HeaderError::MetaTooLong));
    }

    #[test]
    fn rejects_invalid_utf8() {
        assert_eq!(
            Header::parse(&[0x32, 0x30, 0x20, 0xFF, 0xFE]),
            Err(HeaderError::NotUtf8)
        );
    }

    #[test]
    fn round_trips_through_encode() {
        let header = Header::new(Status::INPUT, "What's your name?").expect("header");
        let parsed = Header::parse(&header.encode()).expect("parse");
        assert_eq!(parsed, header);
    }
}
