//! Integration tests for the fetcher using wiremock

use std::io::Write;
use std::time::Duration;

use flate2::write::GzEncoder;
use sha2::{Digest, Sha512};
use tokio::net::UdpSocket;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ignition_rs::fetch::{Compression, HashSpec};
use ignition_rs::{FetchOptions, Fetcher, IgnitionError};

const TIMEOUT: Duration = Duration::from_secs(10);

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn sha512_spec(data: &[u8]) -> HashSpec {
    HashSpec::parse(&format!("sha512-{}", hex::encode(Sha512::digest(data)))).unwrap()
}

#[tokio::test]
async fn test_http_fetch_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/config"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"example file\n".to_vec()))
        .mount(&server)
        .await;

    let mut fetcher = Fetcher::new(TIMEOUT);
    let body = fetcher
        .fetch_to_buffer(&format!("{}/config", server.uri()), FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(body, b"example file\n");
}

#[tokio::test]
async fn test_http_204_yields_no_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let mut fetcher = Fetcher::new(TIMEOUT);
    let body = fetcher
        .fetch_to_buffer(&format!("{}/empty", server.uri()), FetchOptions::default())
        .await
        .unwrap();
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_http_404_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut fetcher = Fetcher::new(TIMEOUT);
    let err = fetcher
        .fetch_to_buffer(&format!("{}/missing", server.uri()), FetchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, IgnitionError::NotFound));
}

#[tokio::test]
async fn test_http_other_status_maps_to_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut fetcher = Fetcher::new(TIMEOUT);
    let err = fetcher
        .fetch_to_buffer(&format!("{}/broken", server.uri()), FetchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, IgnitionError::Failed(_)));
}

#[tokio::test]
async fn test_http_sends_configured_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/secured"))
        .and(header("X-Auth", "r8ewap98gfh4d8"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let mut fetcher = Fetcher::new(TIMEOUT);
    let opts = FetchOptions {
        headers: vec![ignition_rs::config::HttpHeader {
            name: "X-Auth".to_string(),
            value: "r8ewap98gfh4d8".to_string(),
        }],
        ..Default::default()
    };
    let body = fetcher
        .fetch_to_buffer(&format!("{}/secured", server.uri()), opts)
        .await
        .unwrap();
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn test_http_gzip_with_hash_over_decompressed_bytes() {
    let payload = b"this body travels compressed\n";
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/compressed"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(payload)))
        .mount(&server)
        .await;

    let mut fetcher = Fetcher::new(TIMEOUT);
    let opts = FetchOptions {
        compression: Compression::Gzip,
        hash: Some(sha512_spec(payload)),
        ..Default::default()
    };
    let body = fetcher
        .fetch_to_buffer(&format!("{}/compressed", server.uri()), opts)
        .await
        .unwrap();
    assert_eq!(body, payload);
}

#[tokio::test]
async fn test_http_gzip_hash_mismatch_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/compressed"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(b"actual contents")))
        .mount(&server)
        .await;

    let mut fetcher = Fetcher::new(TIMEOUT);
    let opts = FetchOptions {
        compression: Compression::Gzip,
        hash: Some(sha512_spec(b"expected contents")),
        ..Default::default()
    };
    let err = fetcher
        .fetch_to_buffer(&format!("{}/compressed", server.uri()), opts)
        .await
        .unwrap_err();
    assert!(matches!(err, IgnitionError::HashMismatch { .. }));
}

/// A TFTP server that sends one full data block, then aborts the
/// transfer with an error packet.
async fn tftp_serve_then_abort(socket: UdpSocket) {
    let mut buf = [0u8; 1024];
    let (_, client) = socket.recv_from(&mut buf).await.unwrap();

    let mut data = vec![0, 3, 0, 1];
    data.extend_from_slice(&[0x61; 512]);
    socket.send_to(&data, client).await.unwrap();
    socket.recv_from(&mut buf).await.unwrap(); // ack

    let mut error = vec![0, 5, 0, 2];
    error.extend_from_slice(b"access violation\0");
    socket.send_to(&error, client).await.unwrap();
}

#[tokio::test]
async fn test_tftp_write_error_overrides_pipe_eof() {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    tokio::spawn(tftp_serve_then_abort(socket));

    // The pipe reader observes a clean end of stream; the error surfaced
    // must still be the TFTP transfer failure.
    let mut fetcher = Fetcher::new(TIMEOUT);
    let err = fetcher
        .fetch_to_buffer(
            &format!("tftp://127.0.0.1:{port}/config"),
            FetchOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(
        err.to_string().contains("access violation"),
        "unexpected error: {err}"
    );
}
