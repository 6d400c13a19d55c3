//! End-to-end fetch tests against a local canned HTTP server.

#![allow(clippy::unwrap_used)]

use std::io::Write as _;
use std::net::SocketAddr;

use flate2::write::GzEncoder;
use flate2::Compression;
use kube_discovery::{ContextCache, DiscoveryConfig, FetchError, Selector};
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serves exactly one connection with a canned response and returns the
/// request head that was received.
async fn serve_once(response: Vec<u8>) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        let mut head = String::new();
        let mut buf = vec![0u8; 8192];
        while !head.contains("\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            head.push_str(&String::from_utf8_lossy(&buf[..n]));
        }

        socket.write_all(&response).await.unwrap();
        socket.shutdown().await.unwrap();
        head
    });

    (addr, handle)
}

fn http_response(status_line: &str, extra_headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut response = format!("HTTP/1.1 {status_line}\r\n").into_bytes();
    for (name, value) in extra_headers {
        response.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    response.extend_from_slice(
        format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .as_bytes(),
    );
    response.extend_from_slice(body);
    response
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

async fn resolve_context(
    cache: &ContextCache,
    config: &DiscoveryConfig,
) -> std::sync::Arc<kube_discovery::ResolvedContext> {
    cache.resolve(config).await.expect("resolution failed")
}

fn config_for(addr: SocketAddr) -> DiscoveryConfig {
    DiscoveryConfig {
        api_server: Some(format!("http://{addr}")),
        ..DiscoveryConfig::default()
    }
}

#[tokio::test]
async fn fetch_returns_the_plain_body() {
    let (addr, server) = serve_once(http_response("200 OK", &[], b"{\"items\":[]}")).await;

    let cache = ContextCache::new();
    let context = resolve_context(&cache, &config_for(addr)).await;

    let data = context
        .fetch_api_response("pod", "/api/v1/pods")
        .await
        .unwrap();
    assert_eq!(data, b"{\"items\":[]}");

    let head = server.await.unwrap().to_lowercase();
    assert!(head.starts_with("get /api/v1/pods http/1.1"), "head: {head}");
    assert!(head.contains("accept-encoding: gzip"), "head: {head}");
}

#[tokio::test]
async fn fetch_decompresses_gzip_encoded_bodies() {
    let payload = b"{\"kind\":\"PodList\",\"items\":[]}".repeat(20);
    let response = http_response(
        "200 OK",
        &[("Content-Encoding", "gzip")],
        &gzip(&payload),
    );
    let (addr, server) = serve_once(response).await;

    let cache = ContextCache::new();
    let context = resolve_context(&cache, &config_for(addr)).await;

    let data = context
        .fetch_api_response("pod", "/api/v1/pods")
        .await
        .unwrap();
    assert_eq!(data, payload);

    server.await.unwrap();
}

#[tokio::test]
async fn fetch_rejects_unexpected_status_codes() {
    let (addr, server) =
        serve_once(http_response("403 Forbidden", &[], b"pods is forbidden")).await;

    let cache = ContextCache::new();
    let context = resolve_context(&cache, &config_for(addr)).await;

    let err = context
        .fetch_api_response("pod", "/api/v1/pods")
        .await
        .unwrap_err();

    match &err {
        FetchError::UnexpectedStatus { url, status, body } => {
            assert_eq!(status.as_u16(), 403);
            assert!(url.contains("/api/v1/pods"), "url: {url}");
            assert_eq!(body, "pods is forbidden");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // Diagnostics carry the status and the request URL.
    let message = err.to_string();
    assert!(message.contains("403"), "message: {message}");
    assert!(message.contains("/api/v1/pods"), "message: {message}");

    server.await.unwrap();
}

#[tokio::test]
async fn fetch_sends_authorization_and_selector_query() {
    let (addr, server) = serve_once(http_response("200 OK", &[], b"{}")).await;

    let config = DiscoveryConfig {
        api_server: Some(format!("http://{addr}")),
        bearer_token: Some("poll-token".into()),
        namespaces: vec!["monitoring".into()],
        selectors: vec![
            Selector {
                role: "pod".into(),
                label: "app=web".into(),
                field: String::new(),
            },
            Selector {
                role: "node".into(),
                label: "zone=us-east".into(),
                field: String::new(),
            },
        ],
        ..DiscoveryConfig::default()
    };

    let cache = ContextCache::new();
    let context = resolve_context(&cache, &config).await;
    context
        .fetch_api_response("pod", "/api/v1/pods")
        .await
        .unwrap();

    let head = server.await.unwrap();
    let first_line = head.lines().next().unwrap();
    assert_eq!(
        first_line,
        "GET /api/v1/pods?labelSelector=app%3Dweb&fieldSelector=metadata.namespace%3Dmonitoring HTTP/1.1",
    );
    assert!(
        head.to_lowercase().contains("authorization: bearer poll-token"),
        "head: {head}"
    );
}

#[tokio::test]
async fn fetch_preserves_an_api_server_path_prefix() {
    let (addr, server) = serve_once(http_response("200 OK", &[], b"{}")).await;

    // API servers reached through a proxy carry a path prefix; requests must
    // append to it, not replace it.
    let config = DiscoveryConfig {
        api_server: Some(format!("http://{addr}/k8s-proxy")),
        ..DiscoveryConfig::default()
    };

    let cache = ContextCache::new();
    let context = resolve_context(&cache, &config).await;
    context
        .fetch_api_response("pod", "/api/v1/pods")
        .await
        .unwrap();

    let head = server.await.unwrap();
    assert!(
        head.starts_with("GET /k8s-proxy/api/v1/pods HTTP/1.1"),
        "head: {head}"
    );
}

#[tokio::test]
async fn fetch_rejects_bodies_expanding_past_the_cap() {
    // A few hundred KiB of gzip expanding just past the cap.
    let compressed = {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        let zeros = vec![0u8; 1024 * 1024];
        let mut remaining = kube_discovery::fetch::MAX_RESPONSE_BODY_SIZE + 1;
        while remaining > 0 {
            let n = remaining.min(zeros.len());
            encoder.write_all(&zeros[..n]).unwrap();
            remaining -= n;
        }
        encoder.finish().unwrap()
    };
    let response = http_response("200 OK", &[("Content-Encoding", "gzip")], &compressed);
    let (addr, server) = serve_once(response).await;

    let cache = ContextCache::new();
    let context = resolve_context(&cache, &config_for(addr)).await;

    let err = context
        .fetch_api_response("pod", "/api/v1/pods")
        .await
        .unwrap_err();
    assert!(
        matches!(err, FetchError::BodyTooLarge { .. }),
        "unexpected error: {err:?}"
    );

    server.await.unwrap();
}

#[tokio::test]
async fn fetch_without_selectors_sends_no_query() {
    let (addr, server) = serve_once(http_response("200 OK", &[], b"{}")).await;

    let cache = ContextCache::new();
    let context = resolve_context(&cache, &config_for(addr)).await;
    context
        .fetch_api_response("node", "/api/v1/nodes")
        .await
        .unwrap();

    let head = server.await.unwrap();
    assert!(
        head.starts_with("GET /api/v1/nodes HTTP/1.1"),
        "head: {head}"
    );
}
