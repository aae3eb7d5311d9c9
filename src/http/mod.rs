//! HTTP protocol implementation.
//!
//! This module implements a single-request HTTP/1.1 server engine.
//!
//! # Architecture
//!
//! - **`headers`**: Ordered, case-insensitive header map
//! - **`parser`**: Finds the end of the header block across partial reads and parses it
//! - **`body`**: Relays a `Content-Length` framed body to the handler as a stream
//! - **`request`**: HTTP request representation
//! - **`response`**: Response intent (status, headers, body source) with builder
//! - **`writer`**: Writes the status line and headers once, then body bytes
//! - **`connection`**: The per-connection state machine
//! - **`range`**: `Range: bytes=` header parsing
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌──────────────────┐
//!        │ AwaitingHeaders  │ ← Read until "\r\n\r\n"
//!        └──────┬───────────┘
//!               ▼
//!        ┌──────────────────┐
//!        │ ParsingHeaders   │ ← Request line + header fields
//!        └──────┬───────────┘
//!               ▼
//!        ┌──────────────────┐
//!        │ BuildingRequest  │ ← Start body relay for non-GET/HEAD
//!        └──────┬───────────┘      (any of the above may go to Failed)
//!               ▼
//!        ┌──────────────────┐
//!        │  Dispatching     │ ← Handler runs; errors become 500
//!        └──────┬───────────┘
//!               ▼
//!        ┌──────────────────┐
//!        │ WritingResponse  │
//!        └──────┬───────────┘
//!               ▼
//!             Closed
//! ```
//!
//! # Example
//!
//! ```ignore
//! use spindle::http::request::Request;
//! use spindle::http::response::Response;
//! use spindle::router::Router;
//! use spindle::server::Server;
//! use tokio::net::TcpListener;
//!
//! async fn hello(_req: Request) -> anyhow::Result<Response> {
//!     Ok(Response::ok("hello\n"))
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let router = Router::new().route("/", hello);
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     Server::new(router).serve(listener).await
//! }
//! ```

pub mod body;
pub mod connection;
pub mod headers;
pub mod parser;
pub mod range;
pub mod request;
pub mod response;
pub mod writer;
