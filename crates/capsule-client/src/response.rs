use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use capsule_core::{CancelScope, Header};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

/// A parsed response header plus the connection's remaining bytes as a
/// streaming body. The body runs until the server closes the connection;
/// there is no length framing in Gemini.
pub struct Response {
    pub header: Header,
    pub body: Body,
}

impl Response {
    /// Drains the body into memory. Convenience for small documents; large
    /// transfers should read [`Response::body`] incrementally.
    pub async fn body_bytes(&mut self) -> io::Result<Vec<u8>> {
        let mut collected = Vec::new();
        self.body.read_to_end(&mut collected).await?;
        Ok(collected)
    }
}

/// Streaming response body that observes the request's cancellation scope
/// before every read, so a stalled server cannot outlive the caller's
/// deadline.
pub struct Body {
    inner: Box<dyn AsyncRead + Send + Unpin>,
    cancel: CancelScope,
}

impl Body {
    pub(crate) fn new(inner: Box<dyn AsyncRead + Send + Unpin>, cancel: CancelScope) -> Body {
        Body { inner, cancel }
    }
}

impl AsyncRead for Body {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.cancel.is_cancelled() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "request cancelled",
            )));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsule_core::cancel_scope;
    use std::time::Duration;

    #[tokio::test]
    async fn body_reads_until_eof() {
        let (_canceller, scope) = cancel_scope();
        let mut body = Body::new(
            Box::new(std::io::Cursor::new(b"# hi\r\nmore".to_vec())),
            scope,
        );
        let mut collected = Vec::new();
        body.read_to_end(&mut collected).await.expect("read");
        assert_eq!(collected, b"# hi\r\nmore");
    }

    #[tokio::test]
    async fn cancelled_scope_stops_body_reads() {
        let (canceller, scope) = cancel_scope();
        let mut body = Body::new(Box::new(std::io::Cursor::new(vec![0u8; 16])), scope);
        canceller.cancel();
        let err = body
            .read_to_end(&mut Vec::new())
            .await
            .expect_err("cancelled");
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_stops_body_reads() {
        let (_canceller, scope) = cancel_scope();
        let scope = scope.with_timeout(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut body = Body::new(Box::new(std::io::Cursor::new(vec![0u8; 16])), scope);
        let err = body
            .read_to_end(&mut Vec::new())
            .await
            .expect_err("expired");
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
