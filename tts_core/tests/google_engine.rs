//! GoogleTranslateTts against a local HTTP listener

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tts_core::{GoogleTranslateTts, GoogleTtsConfig, SpeechChunk, SpeechEngine, TtsError};

/// Answer one GET with a fixed response and hand back the request head.
async fn serve_once(status_line: &'static str, content_type: &'static str, body: &'static [u8]) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let mut response = format!(
            "{status_line}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(body);
        socket.write_all(&response).await.unwrap();
        socket.flush().await.unwrap();
        String::from_utf8_lossy(&buf).to_string()
    });
    (addr, handle)
}

fn engine(addr: SocketAddr) -> GoogleTranslateTts {
    GoogleTranslateTts::new(GoogleTtsConfig::new(format!("http://{addr}")).with_timeout(5)).unwrap()
}

fn chunk() -> SpeechChunk<'static> {
    SpeechChunk {
        text: "Hello world",
        lang: "en",
        index: 0,
        total: 1,
    }
}

#[tokio::test]
async fn test_audio_response() {
    let (addr, server) = serve_once("HTTP/1.1 200 OK", "audio/mpeg", b"\xFF\xFB\x90\xC0").await;

    let audio = engine(addr).synthesize_chunk(chunk()).await.unwrap();
    assert_eq!(audio, b"\xFF\xFB\x90\xC0");

    let sent = server.await.unwrap();
    assert!(sent.starts_with("GET /translate_tts?"));
    assert!(sent.contains("client=tw-ob"));
    assert!(sent.contains("tl=en"));
    assert!(sent.contains("q=Hello+world"));
    assert!(sent.contains("textlen=11"));
}

#[tokio::test]
async fn test_error_status_is_service_error() {
    let (addr, _server) = serve_once("HTTP/1.1 500 Internal Server Error", "text/plain", b"backend down").await;

    match engine(addr).synthesize_chunk(chunk()).await {
        Err(TtsError::Service(msg)) => {
            assert!(msg.contains("500"));
            assert!(msg.contains("backend down"));
        }
        other => panic!("expected Service error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_html_page_is_invalid_response() {
    let (addr, _server) = serve_once("HTTP/1.1 200 OK", "text/html; charset=UTF-8", b"<html>captcha</html>").await;

    let result = engine(addr).synthesize_chunk(chunk()).await;
    assert!(matches!(result, Err(TtsError::InvalidResponse(msg)) if msg.contains("text/html")));
}

#[tokio::test]
async fn test_empty_audio_is_invalid_response() {
    let (addr, _server) = serve_once("HTTP/1.1 200 OK", "audio/mpeg", b"").await;

    let result = engine(addr).synthesize_chunk(chunk()).await;
    assert!(matches!(result, Err(TtsError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_unreachable_service_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = engine(addr).synthesize_chunk(chunk()).await;
    assert!(matches!(result, Err(TtsError::Network(_))));
}
