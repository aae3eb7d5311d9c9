//! Static file handler with single byte-range support.

use async_trait::async_trait;

use crate::fs::{FileTree, FsError};
use crate::handler::Handler;
use crate::http::headers::Headers;
use crate::http::range::{RangeError, parse_range_header};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBody, ResponseBuilder, StatusCode};

/// Answers requests with files from a [`FileTree`].
///
/// - no `Range` header: `200` with the whole file
/// - `Range: bytes=start[-end]`: `206` with `Content-Range`
/// - malformed range: `400`; range past the end: `416`
/// - unknown path: `404`
pub struct DirectoryTreeHandler<T> {
    tree: T,
    headers: Headers,
    strip_prefix: Option<String>,
}

impl<T: FileTree> DirectoryTreeHandler<T> {
    pub fn new(tree: T) -> Self {
        Self {
            tree,
            headers: Headers::new(),
            strip_prefix: None,
        }
    }

    /// Adds a header to every file response.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Resolves files relative to `prefix` instead of the full request path.
    pub fn strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.strip_prefix = Some(prefix.into());
        self
    }

    pub fn tree(&self) -> &T {
        &self.tree
    }

    fn file_path<'a>(&self, path: &'a str) -> std::borrow::Cow<'a, str> {
        let Some(rest) = self
            .strip_prefix
            .as_deref()
            .and_then(|prefix| path.strip_prefix(prefix))
        else {
            return path.into();
        };

        if rest.starts_with('/') {
            rest.into()
        } else {
            format!("/{rest}").into()
        }
    }

    /// Answers `request`. HEAD gets the same status and headers as GET,
    /// without a body.
    pub async fn respond(&self, request: &Request) -> anyhow::Result<Response> {
        let mut response = self.respond_full(request).await?;
        if request.method() == Method::HEAD {
            response.body = ResponseBody::Empty;
        }
        Ok(response)
    }

    async fn respond_full(&self, request: &Request) -> anyhow::Result<Response> {
        let method = request.method();
        if !matches!(method, Method::GET | Method::HEAD) {
            return Ok(ResponseBuilder::new(StatusCode::MethodNotAllowed)
                .header("Allow", "GET, HEAD")
                .header("Content-Type", "text/plain; charset=utf-8")
                .body(StatusCode::MethodNotAllowed.to_string())
                .build());
        }

        let path = self.file_path(request.path());
        let file = match self.tree.open_file(&path).await {
            Ok(file) => file,
            Err(FsError::NotFound(_)) => {
                tracing::debug!(path = %path, "File not found");
                return Ok(Response::text(StatusCode::NotFound, "Not found"));
            }
            Err(FsError::Io(e)) => return Err(e.into()),
        };

        let size = file.size();
        let mut headers = self.headers.clone();
        let mut status = StatusCode::Ok;

        let file = match request.header("range") {
            None => file,
            Some(value) => {
                let resolved = parse_range_header(value).and_then(|range| range.resolve(size));
                match resolved {
                    Ok((start, end)) => {
                        status = StatusCode::PartialContent;
                        headers.insert("Content-Range", format!("bytes {start}-{end}/{size}"));
                        file.slice(start, Some(end + 1))
                    }
                    Err(RangeError::Malformed(value)) => {
                        tracing::debug!(range = %value, "Malformed Range header");
                        return Ok(Response::bad_request());
                    }
                    Err(RangeError::NotSatisfiable { size }) => {
                        return Ok(ResponseBuilder::new(StatusCode::RangeNotSatisfiable)
                            .header("Content-Range", format!("bytes */{size}"))
                            .header("Content-Type", "text/plain; charset=utf-8")
                            .body(StatusCode::RangeNotSatisfiable.to_string())
                            .build());
                    }
                }
            }
        };

        headers.insert("Accept-Ranges", "bytes");
        headers.insert("Content-Type", file.content_type());
        headers.insert("Content-Length", file.size().to_string());

        let body = if method == Method::HEAD {
            ResponseBody::Empty
        } else {
            ResponseBody::Reader(file.stream().await?)
        };

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl<T: FileTree> Handler for DirectoryTreeHandler<T> {
    async fn call(&self, request: Request) -> anyhow::Result<Response> {
        self.respond(&request).await
    }
}
