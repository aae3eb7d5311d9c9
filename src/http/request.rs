use std::fmt;
use std::str::FromStr;

use crate::http::body::Body;
use crate::http::headers::Headers;
use crate::http::parser::ParseError;

/// HTTP request methods.
///
/// `GET` and `HEAD` requests never carry a body stream; every other method
/// gets one, framed by `Content-Length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
    /// CONNECT - Establish a tunnel
    CONNECT,
    /// TRACE - Message loop-back test
    TRACE,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::CONNECT => "CONNECT",
            Method::TRACE => "TRACE",
        }
    }

    /// Whether a request with this method is framed with a body.
    pub fn has_body(&self) -> bool {
        !matches!(self, Method::GET | Method::HEAD)
    }
}

impl FromStr for Method {
    type Err = ParseError;

    /// Method tokens are case-sensitive.
    ///
    /// ```
    /// # use spindle::http::request::Method;
    /// assert_eq!("GET".parse::<Method>().ok(), Some(Method::GET));
    /// assert!("get".parse::<Method>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "HEAD" => Ok(Method::HEAD),
            "OPTIONS" => Ok(Method::OPTIONS),
            "PATCH" => Ok(Method::PATCH),
            "CONNECT" => Ok(Method::CONNECT),
            "TRACE" => Ok(Method::TRACE),
            other => Err(ParseError::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The request line and header block, before any body is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    /// Raw request target (e.g. "/index.html?x=1")
    pub path: String,
    /// Protocol token (typically "HTTP/1.1")
    pub version: String,
    /// Header names are stored lower-cased
    pub headers: Headers,
}

/// A parsed HTTP request handed to application handlers.
///
/// The request line and headers are read-only once built. The body, when
/// present, is a stream that fills while the handler runs.
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    version: String,
    headers: Headers,
    body: Option<Body>,
}

impl Request {
    pub fn from_head(head: RequestHead, body: Option<Body>) -> Self {
        Self {
            method: head.method,
            path: head.path,
            version: head.version,
            headers: head.headers,
            body,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// The raw request target, query string included.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Retrieves a header value by name, ignoring case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// Declared `Content-Length`, or `None` if missing or not a number.
    pub fn content_length(&self) -> Option<u64> {
        self.headers.content_length().ok().flatten()
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn body_mut(&mut self) -> Option<&mut Body> {
        self.body.as_mut()
    }

    pub fn into_body(self) -> Option<Body> {
        self.body
    }
}

/// Builder for constructing Request objects outside of a connection.
pub struct RequestBuilder {
    method: Option<Method>,
    path: Option<String>,
    version: Option<String>,
    headers: Headers,
    body: Option<Body>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: None,
            path: None,
            version: None,
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into().to_ascii_lowercase(), value);
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        Ok(Request {
            method: self.method.ok_or("method missing")?,
            path: self.path.ok_or("path missing")?,
            version: self.version.unwrap_or_else(|| "HTTP/1.1".to_string()),
            headers: self.headers,
            body: self.body,
        })
    }
}
