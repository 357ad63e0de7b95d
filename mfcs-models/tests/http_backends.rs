//! Integration tests for the HTTP embedding backends
//!
//! Each test starts a one-shot HTTP server on a local port that answers a
//! single request with a canned response and hands the raw request back.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use mfcs_core::types::ApiKey;
use mfcs_core::{Embedder, EmbedderError, EmbeddingScorer, SemanticScorer};
use mfcs_models::{EmbeddingConfig, EmbeddingProvider, OllamaEmbedder, OpenAiEmbedder, embedder_from_config};

/// Serve one request, returning what the client sent
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
        request
    });

    (base_url, handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

// ==================== Ollama Tests ====================

#[tokio::test]
async fn ollama_batch_round_trip() {
    let (base_url, server) =
        serve_once("200 OK", r#"{"model":"m","embeddings":[[1.0,0.0],[0.0,1.0]]}"#).await;
    let embedder = OllamaEmbedder::new("nomic-embed-text").base_url(&base_url);

    let vectors = embedder.embed_batch(&["a", "b"]).await.unwrap();
    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/embed "));
    assert!(request.contains(r#""model":"nomic-embed-text""#));
    assert!(request.contains(r#""input":["a","b"]"#));
}

#[tokio::test]
async fn ollama_error_status_maps_to_api_error() {
    let (base_url, server) =
        serve_once("404 Not Found", r#"{"error":"model not found"}"#).await;
    let embedder = OllamaEmbedder::new("missing").base_url(&base_url);

    let err = embedder.embed("hello").await.unwrap_err();
    assert!(matches!(err, EmbedderError::Api { status: 404, .. }));
    assert!(err.to_string().contains("model not found"));
    server.await.unwrap();
}

#[tokio::test]
async fn ollama_garbage_body_is_invalid_response() {
    let (base_url, server) = serve_once("200 OK", "not json").await;
    let embedder = OllamaEmbedder::new("m").base_url(&base_url);

    let err = embedder.embed("hello").await.unwrap_err();
    assert!(matches!(err, EmbedderError::InvalidResponse(_)));
    server.await.unwrap();
}

#[tokio::test]
async fn connection_refused_is_request_error() {
    // Bind then drop to get a port with nothing listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let embedder = OllamaEmbedder::new("m").base_url(&format!("http://{addr}"));
    let err = embedder.embed("hello").await.unwrap_err();
    assert!(matches!(err, EmbedderError::Request(_)));
}

// ==================== OpenAI Tests ====================

#[tokio::test]
async fn openai_sends_bearer_and_orders_by_index() {
    let (base_url, server) = serve_once(
        "200 OK",
        r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#,
    )
    .await;
    let embedder = OpenAiEmbedder::new("text-embedding-3-small", ApiKey::new("sk-test"))
        .base_url(&format!("{base_url}/v1"));

    let vectors = embedder.embed_batch(&["first", "second"]).await.unwrap();
    assert_eq!(vectors[0], vec![1.0, 0.0]);

    let request = server.await.unwrap().to_lowercase();
    assert!(request.starts_with("post /v1/embeddings "));
    assert!(request.contains("authorization: bearer sk-test"));
}

#[tokio::test]
async fn openai_unauthorized_is_api_error() {
    let (base_url, server) =
        serve_once("401 Unauthorized", r#"{"error":{"message":"bad key"}}"#).await;
    let embedder = OpenAiEmbedder::new("m", ApiKey::new("sk-wrong")).base_url(&base_url);

    let err = embedder.embed("hello").await.unwrap_err();
    assert!(matches!(err, EmbedderError::Api { status: 401, .. }));
    server.await.unwrap();
}

// ==================== Scorer Tests ====================

#[tokio::test]
async fn configured_backend_drives_embedding_scorer() {
    let (base_url, server) =
        serve_once("200 OK", r#"{"embeddings":[[1.0,1.0],[1.0,1.0]]}"#).await;
    let config = EmbeddingConfig {
        provider: Some(EmbeddingProvider::Ollama),
        base_url: Some(base_url),
        timeout_secs: Some(5),
        ..Default::default()
    };
    let scorer = EmbeddingScorer::new(embedder_from_config(&config).unwrap(), 0.45);

    let score = tokio::time::timeout(
        Duration::from_secs(10),
        scorer.score("sunny in Tokyo", "It is sunny in Tokyo"),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(score.matched);
    assert!((score.similarity - 1.0).abs() < 1e-6);
    server.await.unwrap();
}
