//! Integration tests for the HTTP transport

use bytes::Bytes;
use httpmock::prelude::*;
use httpmock::Method::HEAD;
use url::Url;
use blossom_resolverd::config::TransportConfig;
use blossom_resolverd::transport::{HttpTransport, Transport};

const HASH: &str = "b1674191a88ec5cdd733e4240a81803105dc412d6c6708d53ab94fc248f4f553";

fn transport() -> HttpTransport {
    HttpTransport::new(&TransportConfig::default()).unwrap()
}

fn server_url(server: &MockServer) -> Url {
    Url::parse(&server.base_url()).unwrap()
}

#[tokio::test]
async fn test_fetch_returns_body_and_mime_type() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/{}", HASH));
            then.status(200)
                .header("content-type", "image/png")
                .body(b"png bytes");
        })
        .await;

    let blob = transport().fetch(&server_url(&server), HASH).await.unwrap();

    mock.assert_async().await;
    assert_eq!(blob.content, Bytes::from_static(b"png bytes"));
    assert_eq!(blob.mime_type, "image/png");
}

#[tokio::test]
async fn test_fetch_defaults_mime_type() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/{}", HASH));
            then.status(200).body(b"raw");
        })
        .await;

    let blob = transport().fetch(&server_url(&server), HASH).await.unwrap();
    assert_eq!(blob.mime_type, "application/octet-stream");
}

#[tokio::test]
async fn test_fetch_keeps_server_base_path() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/blobs/{}", HASH));
            then.status(200).body(b"nested");
        })
        .await;

    let base = Url::parse(&server.url("/blobs/")).unwrap();
    let blob = transport().fetch(&base, HASH).await.unwrap();

    mock.assert_async().await;
    assert_eq!(blob.content, Bytes::from_static(b"nested"));
}

#[tokio::test]
async fn test_fetch_not_found_is_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/{}", HASH));
            then.status(404);
        })
        .await;

    let err = transport().fetch(&server_url(&server), HASH).await.unwrap_err();
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn test_upload_puts_content() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path(format!("/{}", HASH))
                .header("content-type", "text/plain")
                .body("hello blossom");
            then.status(201);
        })
        .await;

    transport()
        .upload(&server_url(&server), HASH, Bytes::from_static(b"hello blossom"), "text/plain")
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_upload_rejected_is_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(PUT).path(format!("/{}", HASH));
            then.status(401);
        })
        .await;

    let result = transport()
        .upload(&server_url(&server), HASH, Bytes::from_static(b"x"), "text/plain")
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_exists_uses_head() {
    let server = MockServer::start_async().await;
    let present = server
        .mock_async(|when, then| {
            when.method(HEAD).path(format!("/{}", HASH));
            then.status(200);
        })
        .await;
    let missing = server
        .mock_async(|when, then| {
            when.method(HEAD).path("/missing");
            then.status(404);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(HEAD).path("/broken");
            then.status(500);
        })
        .await;

    let base = server_url(&server);
    assert!(transport().exists(&base, HASH).await.unwrap());
    assert!(!transport().exists(&base, "missing").await.unwrap());
    assert!(transport().exists(&base, "broken").await.is_err());

    present.assert_async().await;
    missing.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_server_is_error() {
    let base = Url::parse("http://127.0.0.1:9").unwrap();
    assert!(transport().fetch(&base, HASH).await.is_err());
}
