use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use docqa_core::config::GenerationSettings;
use docqa_core::Error;
use docqa_rag::{ChatCompletionsGenerator, Generator};

/// Serves exactly one HTTP response and hands back the raw request.
async fn one_shot_server(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let length = text[..head_end]
                    .lines()
                    .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap()))
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + length {
                    break;
                }
            }
        }
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&buf).to_string()
    });
    (format!("http://{addr}/v1"), handle)
}

fn settings(base_url: String) -> GenerationSettings {
    GenerationSettings { base_url, api_key: Some("test-key".into()), timeout_secs: Some(5), ..Default::default() }
}

#[tokio::test]
async fn posts_chat_completion_and_returns_content() {
    let (url, server) = one_shot_server("200 OK", r#"{"choices":[{"message":{"role":"assistant","content":"Revenue was $500,000."}}]}"#).await;
    let generator = ChatCompletionsGenerator::from_settings(&settings(url)).unwrap();
    let answer = generator.generate("Question: what was the revenue").await.unwrap();
    assert_eq!(answer, "Revenue was $500,000.");

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /v1/chat/completions"));
    let lower = request.to_ascii_lowercase();
    assert!(lower.contains("authorization: bearer test-key"));
    let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
    let json: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(json["model"], "meta-llama/llama-4-scout-17b-16e-instruct");
    assert_eq!(json["max_tokens"], 2048);
    assert_eq!(json["messages"][0]["role"], "user");
    assert_eq!(json["messages"][0]["content"], "Question: what was the revenue");
}

#[tokio::test]
async fn provider_error_message_is_surfaced() {
    let (url, _server) = one_shot_server("429 Too Many Requests", r#"{"error":{"message":"rate limit reached"}}"#).await;
    let generator = ChatCompletionsGenerator::from_settings(&settings(url)).unwrap();
    let err = generator.generate("hi").await.unwrap_err();
    assert!(matches!(err, Error::Generation { .. }));
    assert!(err.to_string().contains("rate limit reached"), "{err}");
}

#[tokio::test]
async fn empty_answer_is_an_error() {
    let (url, _server) = one_shot_server("200 OK", r#"{"choices":[]}"#).await;
    let generator = ChatCompletionsGenerator::from_settings(&settings(url)).unwrap();
    assert!(matches!(generator.generate("hi").await, Err(Error::Generation { .. })));
}

#[tokio::test]
async fn missing_api_key_fails_without_a_request() {
    let mut s = GenerationSettings::default();
    s.api_key = None;
    let generator = ChatCompletionsGenerator::from_settings(&s).unwrap();
    let err = generator.generate("hi").await.unwrap_err();
    assert!(err.to_string().contains("no API key"));
}

#[tokio::test]
async fn unreachable_endpoint_is_a_generation_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let generator = ChatCompletionsGenerator::from_settings(&settings(format!("http://{addr}"))).unwrap();
    assert!(matches!(generator.generate("hi").await, Err(Error::Generation { .. })));
}
