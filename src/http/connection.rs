use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::Instrument;

use crate::handler::SharedHandler;
use crate::http::body::spawn_body_relay;
use crate::http::parser::{
    DEFAULT_MAX_HEADER_BYTES, HeaderFrame, ParseError, parse_request_head, read_header_block,
};
use crate::http::request::{Method, Request, RequestHead};
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;

/// Per-connection protocol limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub max_header_bytes: usize,
    /// Idle limit for each read; `None` waits forever
    pub read_timeout: Option<Duration>,
    /// Body chunks buffered ahead of the handler
    pub body_channel_capacity: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            read_timeout: None,
            body_channel_capacity: 8,
        }
    }
}

/// Serves exactly one request on a byte stream.
pub struct Connection<S> {
    reader: Option<ReadHalf<S>>,
    writer: ResponseWriter<WriteHalf<S>>,
    handler: SharedHandler,
    settings: ConnectionSettings,
    state: ConnectionState,
    relay: Option<JoinHandle<()>>,
    request_line: Option<(Method, String)>,
}

#[derive(Debug)]
pub enum ConnectionState {
    AwaitingHeaders,
    ParsingHeaders(HeaderFrame),
    BuildingRequest(RequestHead, Bytes),
    Dispatching(Request),
    WritingResponse(Response),
    Closed,
    Failed(ParseError),
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(stream: S, handler: SharedHandler, settings: ConnectionSettings) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Some(reader),
            writer: ResponseWriter::new(writer),
            handler,
            settings,
            state: ConnectionState::AwaitingHeaders,
            relay: None,
            request_line: None,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Drives the connection to `Closed` or `Failed`, then tears it down.
    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            let state = std::mem::replace(&mut self.state, ConnectionState::Closed);

            self.state = match state {
                ConnectionState::AwaitingHeaders => match self.read_headers().await {
                    Ok(frame) => ConnectionState::ParsingHeaders(frame),
                    Err(e) => ConnectionState::Failed(e),
                },

                ConnectionState::ParsingHeaders(frame) => match parse_request_head(&frame.text) {
                    Ok(head) => ConnectionState::BuildingRequest(head, frame.remainder),
                    Err(e) => ConnectionState::Failed(e),
                },

                ConnectionState::BuildingRequest(head, remainder) => {
                    match self.build_request(head, remainder) {
                        Ok(request) => ConnectionState::Dispatching(request),
                        Err(e) => ConnectionState::Failed(e),
                    }
                }

                ConnectionState::Dispatching(request) => {
                    ConnectionState::WritingResponse(self.dispatch(request).await)
                }

                ConnectionState::WritingResponse(response) => {
                    let status = response.status;
                    let result = self.writer.send(response).await;
                    self.teardown().await;
                    result.context("writing response")?;

                    if let Some((method, path)) = &self.request_line {
                        tracing::info!(
                            method = %method,
                            path = %path,
                            status = status.as_u16(),
                            bytes = self.writer.body_bytes(),
                            "Request completed"
                        );
                    }
                    ConnectionState::Closed
                }

                ConnectionState::Closed => break,

                ConnectionState::Failed(e) => return self.fail(e).await,
            };
        }

        Ok(())
    }

    async fn read_headers(&mut self) -> Result<HeaderFrame, ParseError> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| ParseError::Io(io::Error::other("read side already taken")))?;

        read_header_block(
            reader,
            self.settings.max_header_bytes,
            self.settings.read_timeout,
        )
        .await
    }

    fn build_request(&mut self, head: RequestHead, remainder: Bytes) -> Result<Request, ParseError> {
        self.request_line = Some((head.method, head.path.clone()));

        if !head.method.has_body() {
            if !remainder.is_empty() {
                tracing::debug!(
                    bytes = remainder.len(),
                    "Ignoring bytes after headers of bodyless request"
                );
            }
            return Ok(Request::from_head(head, None));
        }

        let content_length = head.headers.content_length().map_err(|_| {
            ParseError::InvalidContentLength(
                head.headers
                    .get("content-length")
                    .unwrap_or_default()
                    .to_string(),
            )
        })?;

        let reader = self
            .reader
            .take()
            .ok_or_else(|| ParseError::Io(io::Error::other("read side already taken")))?;

        let (body, relay) = spawn_body_relay(
            reader,
            remainder,
            content_length.unwrap_or(0),
            self.settings.body_channel_capacity,
            self.settings.read_timeout,
        );
        self.relay = relay;

        Ok(Request::from_head(head, Some(body)))
    }

    async fn dispatch(&mut self, request: Request) -> Response {
        let method = request.method();
        let path = request.path().to_string();

        // A panicking handler only takes down its own task.
        let handler = Arc::clone(&self.handler);
        let task = tokio::spawn(
            async move { handler.call(request).await }.instrument(tracing::Span::current()),
        );
        let _abort = AbortOnDrop(task.abort_handle());

        match task.await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::error!(method = %method, path = %path, error = %e, "Handler failed");
                Response::internal_error()
            }
            Err(e) => {
                tracing::error!(method = %method, path = %path, error = %e, "Handler panicked");
                Response::internal_error()
            }
        }
    }

    async fn fail(&mut self, error: ParseError) -> anyhow::Result<()> {
        tracing::warn!(error = %error, "Protocol error");

        if let Some(status) = error.response_status() {
            if let Err(e) = self.writer.send(Response::status_text(status)).await {
                tracing::debug!(error = %e, "Failed to write error response");
            }
        }

        self.teardown().await;
        Err(error.into())
    }

    async fn teardown(&mut self) {
        if let Some(relay) = self.relay.take() {
            relay.abort();
        }

        if let Err(e) = self.writer.finish().await {
            tracing::debug!(error = %e, "Error closing connection");
        }
    }
}

/// Stops the handler task if the connection is dropped mid-dispatch.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
