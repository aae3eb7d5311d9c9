//! Content-Length framed request bodies.
//!
//! The relay task reads exactly the declared number of bytes off the
//! connection and pushes them through a bounded channel; the handler drains
//! the other end as a [`Body`]. A slow handler stalls the relay instead of
//! letting it buffer the whole body.

use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::http::parser::read_some;

const READ_CHUNK: usize = 8192;

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("body truncated: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },
    #[error("timed out reading body")]
    TimedOut,
    #[error("i/o error reading body: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for BodyError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::TimedOut {
            BodyError::TimedOut
        } else {
            BodyError::Io(e)
        }
    }
}

type Chunk = Result<Bytes, BodyError>;

/// Streaming request body.
#[derive(Debug)]
pub struct Body {
    rx: Option<mpsc::Receiver<Chunk>>,
    content_length: u64,
}

impl Body {
    /// A body with no bytes.
    pub fn empty() -> Self {
        Self {
            rx: None,
            content_length: 0,
        }
    }

    /// A body already held in memory.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Self::empty();
        }

        let content_length = bytes.len() as u64;
        let (tx, rx) = mpsc::channel(1);
        // Fresh channel with one free slot.
        let _ = tx.try_send(Ok(bytes));
        Self {
            rx: Some(rx),
            content_length,
        }
    }

    /// Declared length of the body.
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// Next chunk, or `None` once the declared length has been delivered.
    ///
    /// A connection that closes early yields `Err(BodyError::Truncated)`
    /// before the stream ends.
    pub async fn chunk(&mut self) -> Option<Result<Bytes, BodyError>> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Drains the whole body into memory.
    pub async fn collect(mut self) -> Result<Bytes, BodyError> {
        let mut out = BytesMut::with_capacity(self.content_length.min(64 * 1024) as usize);
        while let Some(chunk) = self.chunk().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out.freeze())
    }
}

/// Starts relaying `content_length` bytes from `reader` into a new [`Body`].
///
/// `remainder` holds bytes that were read together with the header block;
/// they are the first bytes of the body. Anything beyond the declared length
/// is dropped.
pub fn spawn_body_relay<R>(
    reader: R,
    remainder: Bytes,
    content_length: u64,
    capacity: usize,
    read_timeout: Option<Duration>,
) -> (Body, Option<JoinHandle<()>>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    if content_length == 0 {
        return (Body::empty(), None);
    }

    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(relay(reader, remainder, content_length, tx, read_timeout));

    (
        Body {
            rx: Some(rx),
            content_length,
        },
        Some(handle),
    )
}

async fn relay<R>(
    mut reader: R,
    remainder: Bytes,
    content_length: u64,
    tx: mpsc::Sender<Chunk>,
    read_timeout: Option<Duration>,
) where
    R: AsyncRead + Unpin,
{
    let mut remaining = content_length;

    if !remainder.is_empty() {
        let take = remaining.min(remainder.len() as u64) as usize;
        if take < remainder.len() {
            tracing::debug!(
                excess = remainder.len() - take,
                "Discarding bytes past Content-Length"
            );
        }
        remaining -= take as u64;
        if tx.send(Ok(remainder.slice(..take))).await.is_err() {
            return;
        }
    }

    while remaining > 0 {
        let want = remaining.min(READ_CHUNK as u64) as usize;
        let mut buf = BytesMut::zeroed(want);

        let chunk = match read_some(&mut reader, &mut buf, read_timeout).await {
            Ok(0) => {
                let received = content_length - remaining;
                tracing::warn!(expected = content_length, received, "Request body truncated");
                let _ = tx
                    .send(Err(BodyError::Truncated {
                        expected: content_length,
                        received,
                    }))
                    .await;
                return;
            }
            Ok(n) => {
                buf.truncate(n);
                remaining -= n as u64;
                Ok(buf.freeze())
            }
            Err(e) => Err(BodyError::from(e)),
        };

        let failed = chunk.is_err();
        if tx.send(chunk).await.is_err() {
            tracing::trace!("Body consumer dropped; stopping relay");
            return;
        }
        if failed {
            return;
        }
    }
}
