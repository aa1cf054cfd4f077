//! Chat backend integration tests
//!
//! A local axum server stands in for the Sathi backend.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio_test::{assert_err, assert_ok};

use sathi_voice::chat::{ChatClient, ChatSession, PersistedState, Role, STATE_FILE};
use sathi_voice::voice::{HttpSynthesizer, RemoteSynthesizer};
use sathi_voice::{Error, Language};

#[derive(Debug, Clone)]
struct Recorded {
    path: String,
    auth: Option<String>,
    accept: Option<String>,
    body: Value,
}

#[derive(Clone, Default)]
struct Backend {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl Backend {
    fn record(&self, path: &str, headers: &HeaderMap, body: Value) {
        let header = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string)
        };
        self.requests.lock().unwrap().push(Recorded {
            path: path.to_string(),
            auth: header(header::AUTHORIZATION),
            accept: header(header::ACCEPT),
            body,
        });
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn chat(State(backend): State<Backend>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    let reply = format!("Reply to {}", body["message"].as_str().unwrap_or_default());
    backend.record("chat", &headers, body);
    Json(json!({ "response": reply, "conversationId": "c-42" }))
}

async fn crop_advice(State(backend): State<Backend>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    backend.record("crop-advice", &headers, body);
    Json(json!({ "advice": "Sow wheat in early November." }))
}

async fn analyze_pest(State(backend): State<Backend>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    backend.record("analyze-pest", &headers, body);
    Json(json!({ "analysis": "Likely aphids. Spray neem oil." }))
}

async fn conversations() -> Json<Value> {
    Json(json!({
        "conversations": [
            {
                "id": "c-1",
                "preview": "Wheat prices",
                "messageCount": 2,
                "lastMessage": "Prices are rising.",
                "lastUpdated": "2025-01-10T08:05:00Z",
                "language": "hi"
            },
            { "id": "c-2", "preview": "Rain", "messageCount": 4, "lastMessage": "", "language": "en" }
        ]
    }))
}

async fn conversation(Path(id): Path<String>) -> impl IntoResponse {
    if id != "c-1" {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })));
    }
    (
        StatusCode::OK,
        Json(json!({
            "conversation": {
                "language": "hi",
                "messages": [
                    { "role": "user", "parts": "गेहूं का भाव?", "timestamp": "2025-01-10T08:00:00Z" },
                    { "role": "model", "parts": "भाव बढ़ रहे हैं।", "timestamp": "2025-01-10T08:05:00Z" }
                ]
            }
        })),
    )
}

async fn delete_conversation(State(backend): State<Backend>, headers: HeaderMap, Path(id): Path<String>) -> StatusCode {
    backend.record(&format!("delete:{id}"), &headers, Value::Null);
    StatusCode::NO_CONTENT
}

async fn text_to_speech(State(backend): State<Backend>, headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    let silent = body["text"].as_str() == Some("silence.");
    backend.record("tts", &headers, body);
    let audio = if silent { Vec::new() } else { vec![0xFF, 0xFB, 0x90, 0x64] };
    ([(header::CONTENT_TYPE, "audio/mpeg")], audio)
}

async fn overloaded() -> (StatusCode, &'static str) {
    (StatusCode::SERVICE_UNAVAILABLE, "model overloaded")
}

/// Serve the fake backend, returning its API base URL
async fn serve(backend: Backend) -> String {
    let app = Router::new()
        .route("/api/v1/chat/chat", post(chat))
        .route("/api/v1/chat/crop-advice", post(crop_advice))
        .route("/api/v1/chat/analyze-pest", post(analyze_pest))
        .route("/api/v1/chat/conversations", get(conversations))
        .route(
            "/api/v1/chat/conversations/{id}",
            get(conversation).delete(delete_conversation),
        )
        .route("/api/v1/chat/text-to-speech", post(text_to_speech))
        .with_state(backend);

    serve_router(app).await
}

async fn serve_router(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api/v1")
}

#[tokio::test]
async fn test_send_message_round_trip() {
    let backend = Backend::default();
    let url = serve(backend.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let client = ChatClient::new(&url).with_auth_token(Some("secret".to_string()));
    let mut session = ChatSession::restore(client, dir.path(), Language::Hi);

    let reply = assert_ok!(session.send_message("Gehu kab boyein?").await);
    assert_eq!(reply.role, Role::Model);
    assert_eq!(reply.content, "Reply to Gehu kab boyein?");

    assert_eq!(session.messages().len(), 2);
    assert_eq!(session.messages()[0].role, Role::User);
    assert_ne!(session.messages()[0].id, session.messages()[1].id);
    assert_eq!(session.conversation_id(), Some("c-42"));
    assert!(!session.is_loading());

    assert_ok!(session.send_message("Aur chana?").await);

    let requests = backend.requests();
    assert_eq!(
        requests[0].body,
        json!({ "message": "Gehu kab boyein?", "conversationId": null, "language": "hi" })
    );
    assert_eq!(requests[1].body["conversationId"], "c-42");
    assert_eq!(requests[0].auth.as_deref(), Some("Bearer secret"));

    let saved = PersistedState::load(&dir.path().join(STATE_FILE)).unwrap();
    assert_eq!(saved.conversation_id.as_deref(), Some("c-42"));
    assert_eq!(saved.language, Language::Hi);
}

#[tokio::test]
async fn test_send_failure_keeps_user_message() {
    let url = serve_router(Router::new().route("/api/v1/chat/chat", post(overloaded))).await;
    let mut session = ChatSession::new(ChatClient::new(&url), Language::En);

    let err = assert_err!(session.send_message("Hello").await);

    assert!(matches!(err, Error::Chat(ref m) if m.contains("503")));
    assert_eq!(session.messages().len(), 1);
    assert_eq!(session.messages()[0].content, "Hello");
    assert!(!session.is_loading());
    assert_eq!(session.conversation_id(), None);
}

#[tokio::test]
async fn test_crop_advice_and_pest_analysis() {
    let backend = Backend::default();
    let url = serve(backend.clone()).await;
    let mut session = ChatSession::new(ChatClient::new(&url), Language::Hi);

    let advice = assert_ok!(session.get_crop_advice("wheat").await);
    assert_eq!(advice.content, "Sow wheat in early November.");

    assert_ok!(session.analyze_pest("Yellow leaves", Some("cotton")).await);
    assert_ok!(session.analyze_pest("Holes in leaves", None).await);

    let contents: Vec<&str> = session.messages().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        contents,
        vec![
            "Sow wheat in early November.",
            "Pest/Disease Issue: Yellow leaves (Crop: cotton)",
            "Likely aphids. Spray neem oil.",
            "Pest/Disease Issue: Holes in leaves",
            "Likely aphids. Spray neem oil.",
        ]
    );

    let requests = backend.requests();
    assert_eq!(requests[0].body, json!({ "cropType": "wheat", "language": "hi" }));
    assert_eq!(requests[1].body, json!({ "description": "Yellow leaves", "cropType": "cotton" }));
    assert_eq!(requests[2].body, json!({ "description": "Holes in leaves" }));
}

#[tokio::test]
async fn test_load_conversations_and_transcript() {
    let url = serve(Backend::default()).await;
    let mut session = ChatSession::new(ChatClient::new(&url), Language::En);

    let listed = assert_ok!(session.load_conversations().await);
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].message_count, 2);
    assert_eq!(listed[1].last_updated, None);

    assert_ok!(session.load_conversation("c-1").await);

    let ids: Vec<&str> = session.messages().iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["c-1-0", "c-1-1"]);
    assert_eq!(session.messages()[1].role, Role::Model);
    assert_eq!(session.language(), Language::Hi);
    assert_eq!(session.conversation_id(), Some("c-1"));

    assert_err!(session.load_conversation("missing").await);
    assert_eq!(session.conversation_id(), Some("c-1"));
}

#[tokio::test]
async fn test_delete_current_conversation_clears_transcript() {
    let backend = Backend::default();
    let url = serve(backend.clone()).await;
    let mut session = ChatSession::new(ChatClient::new(&url), Language::En);

    assert_ok!(session.load_conversations().await);
    assert_ok!(session.load_conversation("c-1").await);
    assert_ok!(session.delete_conversation("c-1").await);

    assert!(session.messages().is_empty());
    assert_eq!(session.conversation_id(), None);
    assert_eq!(session.conversations().len(), 1);
    assert_eq!(backend.requests()[0].path, "delete:c-1");
}

#[tokio::test]
async fn test_http_synthesizer_posts_text_and_language() {
    let backend = Backend::default();
    let url = serve(backend.clone()).await;

    let synthesizer = HttpSynthesizer::new(format!("{url}/chat/text-to-speech"), Duration::from_secs(5))
        .unwrap()
        .with_auth_token(Some("secret".to_string()));

    let audio = assert_ok!(synthesizer.synthesize("नमस्ते किसान.", Language::Hi).await);
    assert_eq!(audio, vec![0xFF, 0xFB, 0x90, 0x64]);

    let request = &backend.requests()[0];
    assert_eq!(request.body, json!({ "text": "नमस्ते किसान.", "language": "hi" }));
    assert_eq!(request.accept.as_deref(), Some("audio/mpeg"));
    assert_eq!(request.auth.as_deref(), Some("Bearer secret"));

    let err = assert_err!(synthesizer.synthesize("silence.", Language::En).await);
    assert!(matches!(err, Error::Tts(_)));
}

#[tokio::test]
async fn test_http_synthesizer_rejects_error_status() {
    let url = serve_router(Router::new().route("/api/v1/chat/text-to-speech", post(overloaded))).await;

    let synthesizer = HttpSynthesizer::new(format!("{url}/chat/text-to-speech"), Duration::from_secs(5)).unwrap();
    let err = assert_err!(synthesizer.synthesize("Hello.", Language::En).await);

    assert!(err.to_string().contains("503"));
}
