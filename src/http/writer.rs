use std::io;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::http::headers::Headers;
use crate::http::response::{Response, ResponseBody};

const HTTP_VERSION: &str = "HTTP/1.1";

/// Serializes a status line and header block, blank line included.
///
/// The reason phrase is omitted: `HTTP/1.1 206\r\n`.
pub fn serialize_head(status: u16, headers: &Headers) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64 + headers.len() * 32);

    buf.extend_from_slice(format!("{} {}\r\n", HTTP_VERSION, status).as_bytes());

    for (k, v) in headers.iter() {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    buf.extend_from_slice(b"\r\n");
    buf
}

/// Writes one response onto the write side of a connection.
///
/// Status and headers can be changed until the first body write (or
/// [`writable`](Self::writable) call) sends them; after that they are
/// frozen. No `Content-Length` is computed here.
pub struct ResponseWriter<W> {
    stream: W,
    status: u16,
    headers: Headers,
    headers_sent: bool,
    body_bytes: u64,
}

impl<W> ResponseWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(stream: W) -> Self {
        Self {
            stream,
            status: 200,
            headers: Headers::new(),
            headers_sent: false,
            body_bytes: 0,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    /// Body bytes written so far.
    pub fn body_bytes(&self) -> u64 {
        self.body_bytes
    }

    /// Returns `false` (and changes nothing) once headers are on the wire.
    pub fn set_status(&mut self, status: u16) -> bool {
        if self.headers_sent {
            tracing::trace!(status, "Ignoring status change after headers were sent");
            return false;
        }
        self.status = status;
        true
    }

    /// Returns `false` (and changes nothing) once headers are on the wire.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        if self.headers_sent {
            tracing::trace!("Ignoring header change after headers were sent");
            return false;
        }
        self.headers.insert(name, value);
        true
    }

    /// Writes body bytes, sending the head first if needed.
    pub async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.send_head().await?;
        self.stream.write_all(bytes).await?;
        self.body_bytes += bytes.len() as u64;
        Ok(())
    }

    /// Sends the head and hands out the raw sink for body bytes.
    pub async fn writable(&mut self) -> io::Result<&mut W> {
        self.send_head().await?;
        Ok(&mut self.stream)
    }

    /// Copies `reader` to the connection until it ends.
    pub async fn pipe<R>(&mut self, reader: &mut R) -> io::Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        self.send_head().await?;
        let n = tokio::io::copy(reader, &mut self.stream).await?;
        self.body_bytes += n;
        Ok(n)
    }

    /// Writes a complete response intent.
    pub async fn send(&mut self, response: Response) -> io::Result<()> {
        let Response {
            status,
            headers,
            body,
        } = response;

        self.set_status(status.as_u16());
        for (k, v) in headers.iter() {
            self.set_header(k, v);
        }

        match body {
            ResponseBody::Empty => self.send_head().await?,
            ResponseBody::Bytes(bytes) => self.write(&bytes).await?,
            ResponseBody::Reader(mut reader) => {
                self.pipe(&mut reader).await?;
            }
        }

        self.stream.flush().await
    }

    /// Flushes and closes the write side.
    ///
    /// Does not send a head that was never written; a connection that fails
    /// before a response exists closes without one.
    pub async fn finish(&mut self) -> io::Result<()> {
        self.stream.flush().await?;
        self.stream.shutdown().await
    }

    pub fn into_inner(self) -> W {
        self.stream
    }

    async fn send_head(&mut self) -> io::Result<()> {
        if self.headers_sent {
            return Ok(());
        }

        let head = serialize_head(self.status, &self.headers);
        self.stream.write_all(&head).await?;
        self.headers_sent = true;
        Ok(())
    }
}
