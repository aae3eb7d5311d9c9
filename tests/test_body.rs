mod common;

use std::time::Duration;

use bytes::Bytes;
use common::ChunkedReader;
use spindle::http::body::{Body, BodyError, spawn_body_relay};

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

#[tokio::test]
async fn test_body_independent_of_chunk_size() {
    let data = payload(20_000);

    for chunk_size in [1, 7, 512, 4096, 20_000] {
        let reader = ChunkedReader::new(&data[100..], chunk_size);
        let remainder = Bytes::copy_from_slice(&data[..100]);
        let (body, _relay) = spawn_body_relay(reader, remainder, data.len() as u64, 2, None);

        assert_eq!(body.content_length(), 20_000);
        let collected = body.collect().await.unwrap();
        assert_eq!(&collected[..], &data[..], "chunk size {chunk_size}");
    }
}

#[tokio::test]
async fn test_relay_stops_at_content_length() {
    let data = payload(64);
    let reader = ChunkedReader::new(&data, 10);

    let (body, _relay) = spawn_body_relay(reader, Bytes::new(), 25, 4, None);

    assert_eq!(&body.collect().await.unwrap()[..], &data[..25]);
}

#[tokio::test]
async fn test_truncated_stream_reports_error() {
    let reader = ChunkedReader::new(b"partial", 3);
    let (mut body, _relay) = spawn_body_relay(reader, Bytes::from_static(b"a "), 50, 4, None);

    let mut received = Vec::new();
    let mut error = None;
    while let Some(chunk) = body.chunk().await {
        match chunk {
            Ok(bytes) => received.extend_from_slice(&bytes),
            Err(e) => error = Some(e),
        }
    }

    assert_eq!(received, b"a partial");
    assert!(matches!(
        error,
        Some(BodyError::Truncated {
            expected: 50,
            received: 9
        })
    ));
}

#[tokio::test]
async fn test_slow_read_times_out() {
    let (client, server) = tokio::io::duplex(64);
    let (body, _relay) = spawn_body_relay(
        server,
        Bytes::new(),
        10,
        4,
        Some(Duration::from_millis(20)),
    );

    let err = body.collect().await.unwrap_err();

    assert!(matches!(err, BodyError::TimedOut));
    drop(client);
}

#[tokio::test]
async fn test_relay_waits_for_consumer() {
    let data = payload(4096);
    let reader = ChunkedReader::new(&data, 16);
    let (mut body, relay) = spawn_body_relay(reader, Bytes::new(), data.len() as u64, 1, None);
    let relay = relay.unwrap();

    tokio::task::yield_now().await;
    assert!(!relay.is_finished());

    let first = body.chunk().await.unwrap().unwrap();
    assert_eq!(&first[..], &data[..16]);

    drop(body);
    relay.await.unwrap();
}

#[tokio::test]
async fn test_in_memory_bodies() {
    let mut empty = Body::empty();
    assert_eq!(empty.content_length(), 0);
    assert!(empty.chunk().await.is_none());

    let body = Body::from_bytes("payload");
    assert_eq!(body.content_length(), 7);
    assert_eq!(&body.collect().await.unwrap()[..], b"payload");
}
