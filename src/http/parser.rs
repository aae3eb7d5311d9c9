use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::http::headers::Headers;
use crate::http::request::RequestHead;
use crate::http::response::StatusCode;

/// Default cap on the header block, terminator included.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 16 * 1024;

const READ_CHUNK: usize = 4096;
const TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("header block exceeds {limit} bytes")]
    HeadersTooLarge { limit: usize },
    #[error("connection closed before end of headers")]
    IncompleteHeaders,
    #[error("malformed status line: {0:?}")]
    MalformedStatusLine(String),
    #[error("malformed header line: {0:?}")]
    MalformedHeaderLine(String),
    #[error("unknown method: {0:?}")]
    UnknownMethod(String),
    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),
    #[error("timed out reading headers")]
    TimedOut,
    #[error("i/o error reading headers: {0}")]
    Io(#[source] io::Error),
}

impl ParseError {
    /// Status to answer with, if the connection is still worth answering.
    ///
    /// Framing failures (oversized, truncated, timed out) abort without a
    /// response; a header block that arrived whole but is malformed gets 400.
    pub fn response_status(&self) -> Option<StatusCode> {
        match self {
            ParseError::HeadersTooLarge { .. }
            | ParseError::IncompleteHeaders
            | ParseError::TimedOut
            | ParseError::Io(_) => None,
            ParseError::MalformedStatusLine(_)
            | ParseError::MalformedHeaderLine(_)
            | ParseError::UnknownMethod(_)
            | ParseError::InvalidContentLength(_) => Some(StatusCode::BadRequest),
        }
    }
}

impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::TimedOut {
            ParseError::TimedOut
        } else {
            ParseError::Io(e)
        }
    }
}

/// A complete header block plus whatever followed it in the same reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderFrame {
    /// Header text up to, not including, the blank-line terminator
    pub text: String,
    /// Bytes read past the terminator; the start of the body
    pub remainder: Bytes,
}

/// Incremental search for the end of a header block.
///
/// Feed it chunks as they arrive; it yields a [`HeaderFrame`] once the
/// terminator is seen. The result does not depend on how the input was
/// split into chunks.
#[derive(Debug)]
pub struct HeaderAccumulator {
    buf: BytesMut,
    limit: usize,
    scanned: usize,
}

impl HeaderAccumulator {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(limit.min(READ_CHUNK)),
            limit,
            scanned: 0,
        }
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Bytes that can still be accepted before the cap is hit.
    pub fn remaining_capacity(&self) -> usize {
        self.limit.saturating_sub(self.buf.len())
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<HeaderFrame>, ParseError> {
        self.buf.extend_from_slice(chunk);

        // A terminator may straddle the previous chunk boundary.
        let from = self.scanned.saturating_sub(TERMINATOR.len() - 1);
        if let Some(pos) = find_terminator(&self.buf[from..]) {
            let end = from + pos + TERMINATOR.len();
            if end > self.limit {
                return Err(ParseError::HeadersTooLarge { limit: self.limit });
            }

            let mut buf = std::mem::take(&mut self.buf);
            let head = buf.split_to(end);
            let text = String::from_utf8_lossy(&head[..end - TERMINATOR.len()]).into_owned();
            return Ok(Some(HeaderFrame {
                text,
                remainder: buf.freeze(),
            }));
        }

        if self.buf.len() >= self.limit {
            return Err(ParseError::HeadersTooLarge { limit: self.limit });
        }

        self.scanned = self.buf.len();
        Ok(None)
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(TERMINATOR.len()).position(|w| w == TERMINATOR)
}

/// Reads from `reader` until a full header block has arrived.
///
/// Never reads more than `max_header_bytes` in total, so a peer that never
/// sends the terminator costs at most that much.
pub async fn read_header_block<R>(
    reader: &mut R,
    max_header_bytes: usize,
    read_timeout: Option<Duration>,
) -> Result<HeaderFrame, ParseError>
where
    R: AsyncRead + Unpin,
{
    let mut acc = HeaderAccumulator::new(max_header_bytes);
    let mut chunk = vec![0u8; READ_CHUNK.min(max_header_bytes.max(1))];

    loop {
        let want = acc.remaining_capacity().min(chunk.len());
        if want == 0 {
            return Err(ParseError::HeadersTooLarge { limit: max_header_bytes });
        }

        let n = read_some(reader, &mut chunk[..want], read_timeout).await?;
        if n == 0 {
            return Err(ParseError::IncompleteHeaders);
        }

        if let Some(frame) = acc.push(&chunk[..n])? {
            return Ok(frame);
        }
    }
}

/// One read, bounded by an optional idle timeout.
pub(crate) async fn read_some<R>(
    reader: &mut R,
    buf: &mut [u8],
    read_timeout: Option<Duration>,
) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match read_timeout {
        Some(limit) => tokio::time::timeout(limit, reader.read(buf))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "read timed out"))?,
        None => reader.read(buf).await,
    }
}

/// Parses the request line and header fields of a header block.
pub fn parse_request_head(text: &str) -> Result<RequestHead, ParseError> {
    let mut lines = split_lines(text);

    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.split(' ');
    let (Some(method), Some(path), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::MalformedStatusLine(status_line.to_string()));
    };

    if method.is_empty() || path.is_empty() || !version.starts_with("HTTP/") {
        return Err(ParseError::MalformedStatusLine(status_line.to_string()));
    }

    let method = method.parse()?;
    let headers = parse_header_lines(lines)?;

    Ok(RequestHead {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
    })
}

/// Status line and headers of a serialized response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub version: String,
    pub status: u16,
    pub reason: Option<String>,
    pub headers: Headers,
}

/// Parses a response header block (`HTTP/1.1 <code>[ <reason>]`).
pub fn parse_response_head(text: &str) -> Result<ResponseHead, ParseError> {
    let mut lines = split_lines(text);

    let status_line = lines.next().unwrap_or_default();
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .filter(|code| (100..=999).contains(code));

    let Some(status) = status.filter(|_| version.starts_with("HTTP/")) else {
        return Err(ParseError::MalformedStatusLine(status_line.to_string()));
    };

    let reason = parts
        .next()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);

    Ok(ResponseHead {
        version: version.to_string(),
        status,
        reason,
        headers: parse_header_lines(lines)?,
    })
}

fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line))
}

fn parse_header_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Result<Headers, ParseError> {
    let mut headers = Headers::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| ParseError::MalformedHeaderLine(line.to_string()))?;

        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(ParseError::MalformedHeaderLine(line.to_string()));
        }

        headers.insert(key.to_ascii_lowercase(), value.trim());
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::Method;

    const REQ: &[u8] = b"POST /upload?x=1 HTTP/1.1\r\nHost: example.com\r\nContent-Length: 5\r\n\r\nhello";

    fn feed(chunk_size: usize) -> HeaderFrame {
        let mut acc = HeaderAccumulator::new(DEFAULT_MAX_HEADER_BYTES);
        for chunk in REQ.chunks(chunk_size) {
            if let Some(frame) = acc.push(chunk).unwrap() {
                return frame;
            }
        }
        panic!("terminator not found");
    }

    #[test]
    fn chunking_does_not_change_result() {
        let whole = feed(REQ.len());
        for size in [1, 2, 3, 5, 7, 64] {
            let frame = feed(size);
            assert_eq!(frame.text, whole.text);
            assert_eq!(
                parse_request_head(&frame.text).unwrap(),
                parse_request_head(&whole.text).unwrap()
            );
        }
        assert_eq!(&whole.remainder[..], b"hello");
    }

    #[test]
    fn parse_simple_get() {
        let head = parse_request_head("GET / HTTP/1.1\r\nHost: example.com").unwrap();

        assert_eq!(head.method, Method::GET);
        assert_eq!(head.path, "/");
        assert_eq!(head.headers.get("host"), Some("example.com"));
    }

    #[test]
    fn oversized_block_is_rejected() {
        let mut acc = HeaderAccumulator::new(17);
        assert!(acc.push(b"GET / HTTP/1.1\r\n").unwrap().is_none());
        let err = acc.push(b"X").unwrap_err();
        assert!(matches!(err, ParseError::HeadersTooLarge { limit: 17 }));
    }

    #[test]
    fn terminator_past_limit_is_rejected() {
        let mut acc = HeaderAccumulator::new(8);
        let err = acc.push(b"GET / HTTP/1.1\r\n\r\n").unwrap_err();
        assert!(matches!(err, ParseError::HeadersTooLarge { .. }));
    }

    #[test]
    fn framing_errors_abort_without_response() {
        assert!(ParseError::IncompleteHeaders.response_status().is_none());
        assert!(ParseError::HeadersTooLarge { limit: 1 }.response_status().is_none());
        assert_eq!(
            ParseError::MalformedHeaderLine("x".into()).response_status(),
            Some(StatusCode::BadRequest)
        );
    }
}
