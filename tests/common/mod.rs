//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use spindle::handler::Handler;
use spindle::http::connection::{Connection, ConnectionSettings};
use spindle::http::parser::{ResponseHead, parse_response_head};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};

/// Yields its data in fixed-size chunks, one chunk per read.
pub struct ChunkedReader {
    chunks: VecDeque<Vec<u8>>,
    pub consumed: usize,
}

impl ChunkedReader {
    pub fn new(data: &[u8], chunk_size: usize) -> Self {
        Self {
            chunks: data.chunks(chunk_size.max(1)).map(<[u8]>::to_vec).collect(),
            consumed: 0,
        }
    }
}

impl AsyncRead for ChunkedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(mut chunk) = self.chunks.pop_front() {
            let n = chunk.len().min(buf.remaining());
            buf.put_slice(&chunk[..n]);
            self.consumed += n;
            if n < chunk.len() {
                chunk.drain(..n);
                self.chunks.push_front(chunk);
            }
        }
        Poll::Ready(Ok(()))
    }
}

/// Runs one connection over an in-memory stream and returns the raw reply.
pub async fn exchange(handler: impl Handler, request: &[u8]) -> Vec<u8> {
    exchange_with(handler, ConnectionSettings::default(), request).await
}

pub async fn exchange_with(
    handler: impl Handler,
    settings: ConnectionSettings,
    request: &[u8],
) -> Vec<u8> {
    let (mut client, server) = tokio::io::duplex(256 * 1024);
    let conn = Connection::new(server, Arc::new(handler), settings);
    let task = tokio::spawn(conn.run());

    client.write_all(request).await.unwrap();
    client.shutdown().await.unwrap();

    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    let _ = task.await.unwrap();
    out
}

/// Splits a raw reply into its parsed head and body bytes.
pub fn split_response(raw: &[u8]) -> (ResponseHead, Vec<u8>) {
    let end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no header terminator");
    let text = String::from_utf8_lossy(&raw[..end]);
    let head = parse_response_head(&text).unwrap();
    (head, raw[end + 4..].to_vec())
}
