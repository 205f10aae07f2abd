//! Drives the HTTP clients against a local axum server.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use devbot_llm::{LlmClient, LlmError, OllamaClient, OpenAiClient};
use serde_json::{json, Value};
use tokio::net::TcpListener;

type Captured = Arc<Mutex<Vec<Value>>>;

async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn generate_ok(State(captured): State<Captured>, Json(body): Json<Value>) -> Json<Value> {
    captured.lock().unwrap().push(body);
    Json(json!({
        "model": "deepseek-coder:6.7b",
        "response": "Use open() with a context manager.",
        "done": true,
        "prompt_eval_count": 42,
        "eval_count": 7
    }))
}

#[tokio::test]
async fn ollama_posts_generate_request() {
    let captured: Captured = Arc::default();
    let router = Router::new()
        .route("/api/generate", post(generate_ok))
        .with_state(captured.clone());
    let base = spawn(router).await;

    let client = OllamaClient::new(Some(base), "deepseek-coder:6.7b".into());
    let response = client.generate("How do I read a file?").await.unwrap();

    assert_eq!(response.content, "Use open() with a context manager.");
    assert_eq!(response.usage.unwrap().completion_tokens, 7);

    let bodies = captured.lock().unwrap();
    assert_eq!(
        bodies[0],
        json!({
            "model": "deepseek-coder:6.7b",
            "prompt": "How do I read a file?",
            "stream": false
        })
    );
}

#[tokio::test]
async fn ollama_status_error_carries_code_and_body() {
    let router = Router::new().route(
        "/api/generate",
        post(|| async { (StatusCode::NOT_FOUND, "model 'nope' not found") }),
    );
    let base = spawn(router).await;

    let client = OllamaClient::new(Some(base), "nope".into());
    let err = client.generate("hi").await.unwrap_err();
    assert!(matches!(err, LlmError::Status { status: 404, .. }));
    assert_eq!(
        client.answer("hi").await,
        "[LLM Error 404] model 'nope' not found"
    );
}

#[tokio::test]
async fn ollama_missing_response_field_is_invalid() {
    let router = Router::new().route(
        "/api/generate",
        post(|| async { Json(json!({"done": true})) }),
    );
    let base = spawn(router).await;

    let client = OllamaClient::new(Some(base), "m".into());
    assert!(matches!(
        client.generate("hi").await,
        Err(LlmError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn unreachable_server_is_connection_error() {
    // Bind then drop so the port is almost certainly closed.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = OllamaClient::new(Some(format!("http://{addr}")), "m".into());
    let answer = client.answer("hi").await;
    assert!(answer.starts_with("[Connection Error] "), "{answer}");
}

#[tokio::test]
async fn openai_reads_first_choice() {
    let captured: Captured = Arc::default();
    let router = Router::new()
        .route(
            "/v1/chat/completions",
            post(
                |State(captured): State<Captured>, Json(body): Json<Value>| async move {
                    captured.lock().unwrap().push(body);
                    Json(json!({
                        "model": "gpt-4o-mini",
                        "choices": [{"message": {"role": "assistant", "content": "sorted(xs)"}}],
                        "usage": {"prompt_tokens": 5, "completion_tokens": 2}
                    }))
                },
            ),
        )
        .with_state(captured.clone());
    let base = spawn(router).await;

    let client = OpenAiClient::new(Some(base), "gpt-4o-mini".into(), None);
    let response = client.generate("sort a list").await.unwrap();
    assert_eq!(response.content, "sorted(xs)");
    assert_eq!(response.model, "gpt-4o-mini");

    let bodies = captured.lock().unwrap();
    assert_eq!(bodies[0]["messages"][0]["content"], "sort a list");
}
