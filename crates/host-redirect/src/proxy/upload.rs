//! Inbound request bodies, streamed to the upstream as they arrive.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::{Body, BodyDataStream, Bytes};
use futures_core::Stream;

/// Passes the client's body through chunk by chunk, optionally failing once
/// more than `limit` bytes have been seen.
pub struct UploadBody {
    inner: BodyDataStream,
    limit: Option<u64>,
    received: u64,
    over_limit: Arc<AtomicBool>,
}

impl UploadBody {
    pub fn new(body: Body, limit: Option<u64>) -> Self {
        Self {
            inner: body.into_data_stream(),
            limit,
            received: 0,
            over_limit: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set once the body has overrun its limit. Readable after the body
    /// itself has been handed to the client.
    pub fn over_limit(&self) -> Arc<AtomicBool> {
        self.over_limit.clone()
    }
}

impl Stream for UploadBody {
    type Item = Result<Bytes, axum::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.received += chunk.len() as u64;
                if this.limit.is_some_and(|limit| this.received > limit) {
                    this.over_limit.store(true, Ordering::Relaxed);
                    return Poll::Ready(Some(Err(axum::Error::new("request body exceeds limit"))));
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }
}
