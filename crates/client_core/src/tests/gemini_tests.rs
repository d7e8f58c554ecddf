use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
};

use super::*;

struct CapturedRequest {
    model_call: String,
    api_key: Option<String>,
    body: Value,
}

#[derive(Clone)]
struct MockState {
    tx: Arc<Mutex<Option<oneshot::Sender<CapturedRequest>>>>,
    status: StatusCode,
    reply: Value,
}

async fn handle_generate(
    State(state): State<MockState>,
    Path(model_call): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if let Some(tx) = state.tx.lock().await.take() {
        let _ = tx.send(CapturedRequest {
            model_call,
            api_key: headers
                .get(API_KEY_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            body,
        });
    }
    (state.status, Json(state.reply))
}

async fn spawn_gemini_server(
    status: StatusCode,
    reply: Value,
) -> Result<(String, oneshot::Receiver<CapturedRequest>)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (tx, rx) = oneshot::channel();
    let state = MockState {
        tx: Arc::new(Mutex::new(Some(tx))),
        status,
        reply,
    };
    let app = Router::new()
        .route("/v1beta/models/:model_call", post(handle_generate))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), rx))
}

fn editor_for(base_url: String) -> GeminiEditor {
    GeminiEditor::new(GeminiConfig {
        api_key: Some("test-key".into()),
        model: "image-model".into(),
        base_url,
        timeout: Duration::from_secs(5),
    })
    .expect("editor")
}

fn sample_image() -> EncodedImage {
    EncodedImage {
        data: "aGVsbG8=".into(),
        mime_type: "image/jpeg".into(),
    }
}

fn image_reply(data: &str) -> Value {
    json!({
        "candidates": [{
            "content": {
                "parts": [
                    { "text": "Here is the subject." },
                    { "inlineData": { "mimeType": "image/png", "data": data } }
                ]
            }
        }]
    })
}

#[tokio::test]
async fn sends_inline_image_and_instruction() {
    let (base_url, captured) = spawn_gemini_server(StatusCode::OK, image_reply("iVBORw0KGgo="))
        .await
        .expect("spawn server");

    let payload = editor_for(base_url)
        .edit(&sample_image(), "strip it")
        .await
        .expect("edit");
    assert_eq!(payload, "iVBORw0KGgo=");

    let request = captured.await.expect("request captured");
    assert_eq!(request.model_call, "image-model:generateContent");
    assert_eq!(request.api_key.as_deref(), Some("test-key"));

    let parts = &request.body["contents"][0]["parts"];
    assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
    assert_eq!(parts[0]["inlineData"]["data"], "aGVsbG8=");
    assert_eq!(parts[1]["text"], "strip it");
    assert!(parts[0].get("text").is_none());
    assert_eq!(
        request.body["generationConfig"]["responseModalities"],
        json!(["IMAGE", "TEXT"])
    );
}

#[tokio::test]
async fn error_status_is_reported_with_body() {
    let (base_url, _captured) = spawn_gemini_server(
        StatusCode::TOO_MANY_REQUESTS,
        json!({ "error": { "message": "quota exhausted" } }),
    )
    .await
    .expect("spawn server");

    let err = editor_for(base_url)
        .edit(&sample_image(), "strip it")
        .await
        .expect_err("should fail");
    match err {
        RemoteError::Status { status, body } => {
            assert_eq!(status, 429);
            assert!(body.contains("quota exhausted"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn text_only_reply_is_malformed() {
    let reply = json!({
        "candidates": [{ "content": { "parts": [{ "text": "I cannot do that." }] } }]
    });
    let (base_url, _captured) = spawn_gemini_server(StatusCode::OK, reply)
        .await
        .expect("spawn server");

    let err = editor_for(base_url)
        .edit(&sample_image(), "strip it")
        .await
        .expect_err("should fail");
    assert!(
        matches!(&err, RemoteError::Malformed(message) if message.contains("I cannot do that."))
    );
}

#[tokio::test]
async fn invalid_base64_payload_is_malformed() {
    let (base_url, _captured) = spawn_gemini_server(StatusCode::OK, image_reply("%%%"))
        .await
        .expect("spawn server");

    let err = editor_for(base_url)
        .edit(&sample_image(), "strip it")
        .await
        .expect_err("should fail");
    assert!(matches!(err, RemoteError::Malformed(_)));
}

#[tokio::test]
async fn missing_credential_fails_before_any_request() {
    let editor = GeminiEditor::new(GeminiConfig::default()).expect("editor");
    let err = editor
        .edit(&sample_image(), "strip it")
        .await
        .expect_err("should fail");
    assert!(matches!(err, RemoteError::MissingCredential));
}

#[test]
fn endpoint_appends_model_call_to_base_path() {
    let config = GeminiConfig {
        base_url: "https://proxy.example/gemini/".into(),
        model: "m".into(),
        ..GeminiConfig::default()
    };
    assert_eq!(
        config.endpoint().expect("endpoint").as_str(),
        "https://proxy.example/gemini/v1beta/models/m:generateContent"
    );

    let config = GeminiConfig {
        base_url: "not a url".into(),
        ..GeminiConfig::default()
    };
    assert!(matches!(
        config.endpoint(),
        Err(RemoteError::InvalidEndpoint(_))
    ));
}

#[test]
fn response_without_candidates_is_malformed() {
    let body: GenerateContentResponse = serde_json::from_value(json!({})).expect("parse");
    assert!(matches!(extract_image(body), Err(RemoteError::Malformed(_))));
}

#[test]
fn snake_case_inline_data_is_accepted() {
    let body: GenerateContentResponse = serde_json::from_value(json!({
        "candidates": [{ "content": { "parts": [{ "inline_data": { "data": "QUFB" } }] } }]
    }))
    .expect("parse");
    assert_eq!(extract_image(body).expect("image"), "QUFB");
}
