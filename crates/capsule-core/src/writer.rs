use std::io;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};

use crate::framing::encode_header;
use crate::status::Status;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("header already written")]
    HeaderAlreadyWritten,
    #[error("cannot write body without success code")]
    BodyWithoutSuccessCode,
    #[error("write deadline exceeded")]
    DeadlineExceeded,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Response writer enforcing the one-header-then-optional-body contract.
///
/// The writer starts out pending. The first [`set_header`](Self::set_header)
/// emits the status line and pins the status; any later call fails with
/// [`WriteError::HeaderAlreadyWritten`] and puts nothing on the wire. Writing
/// body bytes while pending implicitly emits a `20` header with the default
/// MIME type first; writing after a non-success header fails with
/// [`WriteError::BodyWithoutSuccessCode`].
pub struct ResponseWriter {
    out: Box<dyn AsyncWrite + Send + Unpin>,
    status: Option<Status>,
    header: Vec<u8>,
    body_bytes: u64,
    write_deadline: Option<Instant>,
}

impl ResponseWriter {
    pub fn new(out: impl AsyncWrite + Send + Unpin + 'static) -> ResponseWriter {
        ResponseWriter {
            out: Box::new(out),
            status: None,
            header: Vec::new(),
            body_bytes: 0,
            write_deadline: None,
        }
    }

    /// Bounds every subsequent write by an absolute deadline.
    pub fn with_write_deadline(mut self, deadline: Instant) -> ResponseWriter {
        self.write_deadline = Some(deadline);
        self
    }

    /// Emits the `<status> <meta>` line. Valid exactly once, before any body
    /// bytes.
    pub async fn set_header(&mut self, status: Status, meta: &str) -> Result<(), WriteError> {
        if self.status.is_some() {
            return Err(WriteError::HeaderAlreadyWritten);
        }
        self.status = Some(status);
        let line = encode_header(status, meta);
        self.write_all(&line).await?;
        self.header = line;
        Ok(())
    }

    /// Writes body bytes, implicitly sending a `20` header with the default
    /// MIME type if none was set yet.
    pub async fn write(&mut self, body: &[u8]) -> Result<usize, WriteError> {
        match self.status {
            None => self.set_header(Status::SUCCESS, "").await?,
            Some(status) if !status.is_success() => {
                return Err(WriteError::BodyWithoutSuccessCode)
            }
            Some(_) => {}
        }
        self.write_all(body).await?;
        self.body_bytes += body.len() as u64;
        Ok(body.len())
    }

    /// The status sent so far, if any.
    pub fn status(&self) -> Option<Status> {
        self.status
    }

    /// Size of the header line put on the wire, for logging.
    pub fn header_bytes(&self) -> usize {
        self.header.len()
    }

    /// Number of body bytes put on the wire, for logging.
    pub fn body_bytes(&self) -> u64 {
        self.body_bytes
    }

    /// Flushes and shuts the stream down, consuming the writer.
    pub async fn finish(mut self) -> Result<(), WriteError> {
        let deadline = self.write_deadline;
        bounded(deadline, async {
            self.out.flush().await?;
            self.out.shutdown().await
        })
        .await
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), WriteError> {
        let deadline = self.write_deadline;
        bounded(deadline, self.out.write_all(bytes)).await
    }
}

async fn bounded<F>(deadline: Option<Instant>, fut: F) -> Result<(), WriteError>
where
    F: std::future::Future<Output = io::Result<()>>,
{
    match deadline {
        Some(deadline) => match timeout_at(deadline, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(WriteError::DeadlineExceeded),
        },
        None => Ok(fut.await?),
    }
}
