//! Wire-level building blocks for the Gemini protocol.
//!
//! Gemini is a deliberately small request/response protocol: the client sends
//! a single CRLF-terminated URL, the server answers with a single
//! `<status> <meta>` header line and, for success statuses only, a body that
//! runs until the connection closes. This crate provides the pieces both
//! sides of a connection agree on: status codes, the bounded CRLF line
//! reader, the response header codec, the response-writer state machine, a
//! cancellation scope, and a `text/gemini` parser and document builder.

mod cancel;
mod framing;
mod gemtext;
mod header;
mod status;
mod writer;

pub use cancel::{cancel_scope, CancelScope, Canceller};
pub use framing::{
    encode_header, read_crlf_line, write_header, LineError, DEFAULT_MIME_TYPE, MAX_META_LEN,
    MAX_URL_LEN, REQUEST_LINE_LIMIT, RESPONSE_LINE_LIMIT,
};
pub use gemtext::{DocumentBuilder, Gemtext, GemtextLine};
pub use header::{Header, HeaderError};
pub use status::{InvalidStatus, Status};
pub use writer::{ResponseWriter, WriteError};

/// Default port a Gemini server listens on and a client dials when the URL
/// does not carry an explicit one.
pub const DEFAULT_PORT: u16 = 1965;
