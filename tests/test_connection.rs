mod common;

use std::time::Duration;

use anyhow::bail;
use bytes::BytesMut;
use common::{exchange, exchange_with, split_response};
use spindle::files::DirectoryTreeHandler;
use spindle::fs::MemoryTree;
use spindle::http::connection::ConnectionSettings;
use spindle::http::request::Request;
use spindle::http::response::{Response, ResponseBuilder, StatusCode};
use spindle::router::Router;

async fn echo(mut req: Request) -> anyhow::Result<Response> {
    let mut out = BytesMut::new();
    if let Some(body) = req.body_mut() {
        while let Some(chunk) = body.chunk().await {
            out.extend_from_slice(&chunk?);
        }
    }
    Ok(Response::ok(out.freeze()))
}

async fn describe(req: Request) -> anyhow::Result<Response> {
    let text = format!(
        "{} {} {} host={}",
        req.method(),
        req.path(),
        req.version(),
        req.header("host").unwrap_or("-")
    );
    Ok(ResponseBuilder::new(StatusCode::Created)
        .header("X-Handler", "describe")
        .body(text)
        .build())
}

async fn broken(_req: Request) -> anyhow::Result<Response> {
    bail!("backend unavailable")
}

async fn panics(req: Request) -> anyhow::Result<Response> {
    let segments: Vec<&str> = Vec::new();
    Ok(Response::ok(format!("{}{}", req.path(), segments[3])))
}

fn site() -> Router {
    let files = MemoryTree::new().with_file("/hello.txt", "hello, world", "text/plain");
    Router::new()
        .route("/echo", echo)
        .route("/", DirectoryTreeHandler::new(files))
}

#[tokio::test]
async fn test_handler_sees_parsed_request() {
    let raw = exchange(
        describe,
        b"GET /items?id=7 HTTP/1.1\r\nHost: example.com\r\n\r\n",
    )
    .await;
    let (head, body) = split_response(&raw);

    assert_eq!(head.status, 201);
    assert_eq!(head.headers.get("x-handler"), Some("describe"));
    assert_eq!(head.headers.content_length(), Ok(Some(body.len() as u64)));
    assert_eq!(body, b"GET /items?id=7 HTTP/1.1 host=example.com");
}

#[tokio::test]
async fn test_status_line_has_no_reason_phrase() {
    let raw = exchange(describe, b"GET / HTTP/1.1\r\n\r\n").await;

    assert!(raw.starts_with(b"HTTP/1.1 201\r\n"));
}

#[tokio::test]
async fn test_serves_file_range_through_router() {
    let raw = exchange(
        site(),
        b"GET /hello.txt HTTP/1.1\r\nRange: bytes=7-11\r\n\r\n",
    )
    .await;
    let (head, body) = split_response(&raw);

    assert_eq!(head.status, 206);
    assert_eq!(head.headers.get("content-range"), Some("bytes 7-11/12"));
    assert_eq!(body, b"world");
}

#[tokio::test]
async fn test_post_body_streams_to_handler() {
    let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 256) as u8).collect();
    let mut raw_request = format!(
        "POST /echo HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
        payload.len()
    )
    .into_bytes();
    raw_request.extend_from_slice(&payload);

    let settings = ConnectionSettings {
        body_channel_capacity: 1,
        ..ConnectionSettings::default()
    };
    let raw = exchange_with(site(), settings, &raw_request).await;
    let (head, body) = split_response(&raw);

    assert_eq!(head.status, 200);
    assert_eq!(body, payload);
}

#[tokio::test]
async fn test_body_in_same_packet_as_headers() {
    let raw = exchange(
        echo,
        b"PUT /upload HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello",
    )
    .await;
    let (head, body) = split_response(&raw);

    assert_eq!(head.status, 200);
    assert_eq!(body, b"hello");
}

#[tokio::test]
async fn test_bytes_past_content_length_are_ignored() {
    let raw = exchange(
        echo,
        b"POST /echo HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcdef",
    )
    .await;
    let (_, body) = split_response(&raw);

    assert_eq!(body, b"abc");
}

#[tokio::test]
async fn test_truncated_body_fails_handler() {
    let raw = exchange(
        echo,
        b"POST /echo HTTP/1.1\r\nContent-Length: 100\r\n\r\nonly a few",
    )
    .await;
    let (head, _) = split_response(&raw);

    assert_eq!(head.status, 500);
}

#[tokio::test]
async fn test_handler_error_is_internal_server_error() {
    let raw = exchange(broken, b"GET / HTTP/1.1\r\n\r\n").await;
    let (head, body) = split_response(&raw);

    assert_eq!(head.status, 500);
    assert_eq!(body, b"500 Internal Server Error");
}

#[tokio::test]
async fn test_handler_panic_is_internal_server_error() {
    let raw = exchange(panics, b"GET / HTTP/1.1\r\n\r\n").await;
    let (head, body) = split_response(&raw);

    assert_eq!(head.status, 500);
    assert_eq!(body, b"500 Internal Server Error");
}

#[tokio::test]
async fn test_head_error_response_has_no_body() {
    let raw = exchange(site(), b"HEAD /missing.txt HTTP/1.1\r\n\r\n").await;
    let (head, body) = split_response(&raw);

    assert_eq!(head.status, 404);
    assert_eq!(head.headers.content_length(), Ok(Some(9)));
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_malformed_header_is_bad_request() {
    let raw = exchange(describe, b"GET / HTTP/1.1\r\nNoColonHere\r\n\r\n").await;
    let (head, _) = split_response(&raw);

    assert_eq!(head.status, 400);
}

#[tokio::test]
async fn test_unknown_method_is_bad_request() {
    let raw = exchange(describe, b"BREW /pot HTTP/1.1\r\n\r\n").await;
    let (head, _) = split_response(&raw);

    assert_eq!(head.status, 400);
}

#[tokio::test]
async fn test_invalid_content_length_is_bad_request() {
    let raw = exchange(
        echo,
        b"POST /echo HTTP/1.1\r\nContent-Length: lots\r\n\r\n",
    )
    .await;
    let (head, _) = split_response(&raw);

    assert_eq!(head.status, 400);
}

#[tokio::test]
async fn test_oversized_headers_close_without_response() {
    let settings = ConnectionSettings {
        max_header_bytes: 256,
        ..ConnectionSettings::default()
    };
    let mut request = b"GET / HTTP/1.1\r\nX-Filler: ".to_vec();
    request.extend(std::iter::repeat_n(b'x', 1024));
    request.extend_from_slice(b"\r\n\r\n");

    let raw = exchange_with(describe, settings, &request).await;

    assert!(raw.is_empty());
}

#[tokio::test]
async fn test_incomplete_headers_close_without_response() {
    let raw = exchange(describe, b"GET / HTTP/1.1\r\nHost: exa").await;

    assert!(raw.is_empty());
}

#[tokio::test]
async fn test_idle_connection_times_out() {
    let settings = ConnectionSettings {
        read_timeout: Some(Duration::from_millis(50)),
        ..ConnectionSettings::default()
    };
    let (client, server) = tokio::io::duplex(1024);
    let conn = spindle::http::connection::Connection::new(
        server,
        std::sync::Arc::new(describe),
        settings,
    );

    let result = tokio::time::timeout(Duration::from_secs(5), conn.run())
        .await
        .expect("connection should give up on its own");

    assert!(result.is_err());
    drop(client);
}
