use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use smartbot::chat::ChatService;
use smartbot::config::Config;
use smartbot::embedding::EmbeddingProvider;
use smartbot::llm::ModelManager;
use smartbot::models::{HitSource, MessageKind};
use smartbot::{db, migrate, server};

/// Letter-frequency vectors: texts sharing vocabulary land close together.
struct LetterEmbedder {
    texts: AtomicUsize,
}

impl LetterEmbedder {
    fn new() -> Self {
        Self {
            texts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    fn model_name(&self) -> &str {
        "letters"
    }

    fn dims(&self) -> usize {
        26
    }

    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 26];
                for c in t.to_ascii_lowercase().bytes() {
                    if c.is_ascii_lowercase() {
                        v[(c - b'a') as usize] += 1.0;
                    }
                }
                v
            })
            .collect())
    }
}

/// Every call fails, as an unreachable embedding server would.
struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn model_name(&self) -> &str {
        "offline"
    }

    fn dims(&self) -> usize {
        3
    }

    async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding backend is down")
    }
}

fn test_config(dir: &Path) -> Config {
    let mut config = Config::minimal();
    config.db.path = dir.join("chats.sqlite");
    config.model.default = "fallback".to_string();
    config.uploads.max_file_size = 1024;
    config
}

async fn service(
    dir: &Path,
    provider: Option<Arc<dyn EmbeddingProvider>>,
) -> Arc<ChatService> {
    let config = test_config(dir);
    let pool = db::connect(&config).await.unwrap();
    migrate::apply(&pool).await.unwrap();
    Arc::new(ChatService::new(
        Arc::new(config),
        pool,
        ModelManager::with_models(Vec::new(), "fallback"),
        provider,
    ))
}

async fn saved_chat(chat: &ChatService, question: &str, name: &str) -> String {
    let session = chat.sessions().create_session().await;
    chat.send(&session.id, question, Some(false)).await.unwrap();
    chat.save(&session.id, Some(name), None).await.unwrap();
    session.id
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

// ============ Store and retrieval ============

#[tokio::test]
async fn test_save_load_round_trip_preserves_messages() {
    let tmp = TempDir::new().unwrap();
    let chat = service(tmp.path(), None).await;

    let id = saved_chat(&chat, "What is the capital of France?", "Geography").await;
    let live = chat.sessions().get(&id).await.unwrap();

    let stored = chat.store().load_session(&id).await.unwrap().unwrap();
    assert_eq!(stored.name.as_deref(), Some("Geography"));
    assert_eq!(stored.messages.len(), 3);
    for (a, b) in stored.messages.iter().zip(live.messages.iter()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.kind, b.kind);
        assert_eq!(a.content, b.content);
    }

    chat.sessions().remove(&id).await;
    let loaded = chat.load(&id).await.unwrap();
    assert_eq!(loaded.messages.len(), 3);
    assert!(chat.sessions().exists(&id).await);
}

#[tokio::test]
async fn test_resave_replaces_messages() {
    let tmp = TempDir::new().unwrap();
    let chat = service(tmp.path(), None).await;

    let id = saved_chat(&chat, "What is 2+2?", "Math").await;
    chat.send(&id, "What is 3*3?", Some(false)).await.unwrap();
    chat.save(&id, None, None).await.unwrap();

    let summaries = chat.store().list_sessions().await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].name, "Math");
    assert_eq!(summaries[0].message_count, 5);

    let stats = chat.store().statistics().await.unwrap();
    assert_eq!(stats.total_sessions, 1);
    assert_eq!(stats.total_messages, 5);
    assert!(stats.latest_activity.is_some());
}

#[tokio::test]
async fn test_text_search_without_provider() {
    let tmp = TempDir::new().unwrap();
    let chat = service(tmp.path(), None).await;
    saved_chat(&chat, "Explain photosynthesis in simple terms", "Plants").await;
    saved_chat(&chat, "What is 25 * 4?", "Numbers").await;

    let hits = chat.rag().relevant_context("PHOTOSYNTHESIS", 5).await;
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.source == HitSource::TextSearch));
    assert!(hits.iter().all(|h| h.session_name.as_deref() == Some("Plants")));
    assert!(hits.iter().all(|h| (h.relevance - 0.5).abs() < f64::EPSILON));

    let stats = chat.rag().statistics().await.unwrap();
    assert!(!stats.vector_search_available);
    assert_eq!(stats.indexed_documents, 0);
    assert_eq!(stats.total_sessions, 2);
}

#[tokio::test]
async fn test_vector_index_and_search() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(LetterEmbedder::new());
    let chat = service(tmp.path(), Some(embedder.clone())).await;

    let plants = saved_chat(&chat, "Explain photosynthesis in simple terms", "Plants").await;
    saved_chat(&chat, "What is 25 * 4?", "Numbers").await;

    let stats = chat.rag().statistics().await.unwrap();
    assert!(stats.vector_search_available);
    assert_eq!(stats.embedding_model.as_deref(), Some("letters"));
    assert!(stats.indexed_documents >= 2);

    let hits = chat
        .rag()
        .relevant_context("Explain photosynthesis in simple terms", 1)
        .await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source, HitSource::VectorSearch);
    assert_eq!(hits[0].session_id, plants);
    assert_eq!(hits[0].kind, MessageKind::User);
    assert!(hits[0].relevance > 0.99);
}

#[tokio::test]
async fn test_reindex_skips_unchanged_messages() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(LetterEmbedder::new());
    let chat = service(tmp.path(), Some(embedder.clone())).await;

    let id = saved_chat(&chat, "How does gravity work?", "Physics").await;
    let embedded_once = embedder.texts.load(Ordering::SeqCst);
    assert!(embedded_once > 0);

    assert!(chat.rag().index_session(&id).await.unwrap());
    assert_eq!(embedder.texts.load(Ordering::SeqCst), embedded_once);

    assert_eq!(chat.rag().index_all().await.unwrap(), 1);
    assert_eq!(embedder.texts.load(Ordering::SeqCst), embedded_once);
}

#[tokio::test]
async fn test_delete_removes_vectors() {
    let tmp = TempDir::new().unwrap();
    let chat = service(tmp.path(), Some(Arc::new(LetterEmbedder::new()))).await;

    let id = saved_chat(&chat, "How does gravity work?", "Physics").await;
    assert!(chat.rag().statistics().await.unwrap().indexed_documents > 0);

    chat.delete(&id).await.unwrap();
    let stats = chat.rag().statistics().await.unwrap();
    assert_eq!(stats.indexed_documents, 0);
    assert_eq!(stats.total_sessions, 0);
    assert!(chat.rag().relevant_context("gravity", 3).await.is_empty());
    assert!(chat.delete(&id).await.is_err());
}

#[tokio::test]
async fn test_failing_embedder_falls_back_to_text_search() {
    let tmp = TempDir::new().unwrap();
    let chat = service(tmp.path(), Some(Arc::new(FailingEmbedder))).await;
    saved_chat(&chat, "Explain photosynthesis in simple terms", "Plants").await;

    let stats = chat.rag().statistics().await.unwrap();
    assert!(stats.vector_search_available);
    assert_eq!(stats.indexed_documents, 0);
    assert_eq!(stats.total_sessions, 1);

    let hits = chat.rag().relevant_context("photosynthesis", 3).await;
    assert!(!hits.is_empty());
    assert!(hits.iter().all(|h| h.source == HitSource::TextSearch));
}

#[tokio::test]
async fn test_summary_keeps_first_and_last_three() {
    let tmp = TempDir::new().unwrap();
    let chat = service(tmp.path(), None).await;

    let session = chat.sessions().create_session().await;
    for q in [
        "What is 2+2?",
        "What is 5*5?",
        "What is 10-3?",
        "How does gravity work?",
    ] {
        chat.send(&session.id, q, Some(false)).await.unwrap();
    }
    chat.save(&session.id, Some("Quiz"), None).await.unwrap();

    let summary = chat.rag().session_summary(&session.id).await.unwrap();
    let parts: Vec<&str> = summary.split(" | ").collect();
    assert_eq!(parts.len(), 6, "summary: {}", summary);
    assert_eq!(
        parts[0],
        "Bot: Hello! I'm SmartBot Pro. How can I assist you today?"
    );
    assert_eq!(parts[1], "User: What is 2+2?");
    assert!(parts[2].starts_with("Bot: 4."));
    assert_eq!(parts[4], "User: How does gravity work?");
    assert!(parts[5].starts_with("Bot: Gravity is the force"));
    assert!(!summary.contains("5*5"));
    assert!(!summary.contains("10-3"));

    assert_eq!(chat.rag().session_summary("missing").await.unwrap(), "");
}

#[tokio::test]
async fn test_resave_after_clear_prunes_vectors() {
    let tmp = TempDir::new().unwrap();
    let chat = service(tmp.path(), Some(Arc::new(LetterEmbedder::new()))).await;

    let id = saved_chat(&chat, "How does gravity work?", "Physics").await;
    chat.send(&id, "What is the capital of France?", Some(false))
        .await
        .unwrap();
    chat.save(&id, None, None).await.unwrap();
    assert_eq!(chat.rag().statistics().await.unwrap().indexed_documents, 5);

    chat.sessions().clear(&id).await;
    chat.save(&id, Some("Physics"), None).await.unwrap();

    let stats = chat.rag().statistics().await.unwrap();
    assert_eq!(stats.indexed_documents, 1);
    assert_eq!(stats.total_messages, 1);
    assert!(chat.rag().relevant_context("gravity", 3).await.len() <= 1);
}

#[tokio::test]
async fn test_send_with_retrieval_records_metadata() {
    let tmp = TempDir::new().unwrap();
    let chat = service(tmp.path(), Some(Arc::new(LetterEmbedder::new()))).await;
    saved_chat(&chat, "Explain photosynthesis in simple terms", "Plants").await;

    let session = chat.sessions().create_session().await;
    let reply = chat
        .send(&session.id, "Tell me about photosynthesis", Some(true))
        .await
        .unwrap();
    assert_eq!(reply.metadata["retrieval"], true);
    assert_eq!(reply.metadata["model"], "fallback");

    let reply = chat.send(&session.id, "Thanks!", Some(false)).await.unwrap();
    assert_eq!(reply.metadata["retrieval"], false);
}

// ============ HTTP API ============

#[tokio::test]
async fn test_health_and_index_page() {
    let tmp = TempDir::new().unwrap();
    let app = server::router(service(tmp.path(), None).await);

    let res = app.clone().oneshot(empty_request("GET", "/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    let res = app.oneshot(empty_request("GET", "/")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("<title>SmartBot Pro</title>"));
}

#[tokio::test]
async fn test_chat_flow_over_http() {
    let tmp = TempDir::new().unwrap();
    let app = server::router(service(tmp.path(), None).await);

    let res = app
        .clone()
        .oneshot(empty_request("POST", "/api/sessions"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let created = body_json(res).await;
    let id = created["session"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["session"]["messages"].as_array().unwrap().len(), 1);
    assert_eq!(created["preferences"]["theme"], "default");

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/sessions/{}/messages", id),
            serde_json::json!({ "content": "What is 2+2?", "use_rag": false }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let sent = body_json(res).await;
    assert_eq!(sent["message"]["kind"], "bot");
    assert!(sent["message"]["content"].as_str().unwrap().starts_with('4'));
    assert_eq!(sent["segments"][0]["type"], "text");

    let res = app
        .clone()
        .oneshot(empty_request("GET", &format!("/api/sessions/{}/stats", id)))
        .await
        .unwrap();
    let stats = body_json(res).await;
    assert_eq!(stats["total_messages"], 3);
    assert_eq!(stats["user_messages"], 1);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/sessions/{}/save", id),
            serde_json::json!({ "name": "Arithmetic" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["name"], "Arithmetic");

    let res = app
        .clone()
        .oneshot(empty_request("GET", "/api/saved"))
        .await
        .unwrap();
    let saved = body_json(res).await;
    assert_eq!(saved["sessions"][0]["id"], id.as_str());

    let res = app
        .clone()
        .oneshot(empty_request("GET", &format!("/api/saved/{}/summary", id)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let summary = body_json(res).await;
    assert!(summary["summary"].as_str().unwrap().contains("User: What is 2+2?"));

    let res = app
        .clone()
        .oneshot(empty_request("GET", "/api/search?q=2%2B2"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let search = body_json(res).await;
    assert!(!search["results"].as_array().unwrap().is_empty());
    assert!(search["prompt"]
        .as_str()
        .unwrap()
        .contains("Current question: 2+2"));

    let res = app
        .clone()
        .oneshot(empty_request("DELETE", &format!("/api/saved/{}", id)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .oneshot(empty_request("POST", &format!("/api/saved/{}/load", id)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(res).await["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_error_contract() {
    let tmp = TempDir::new().unwrap();
    let chat = service(tmp.path(), None).await;
    let session = chat.sessions().create_session().await;
    let app = server::router(chat);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/sessions/{}/messages", session.id),
            serde_json::json!({ "content": "   " }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(res).await;
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(body["error"]["message"], "message is empty");

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/sessions/missing/messages",
            serde_json::json!({ "content": "hi" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app
        .clone()
        .oneshot(empty_request("GET", "/api/search?q=%20"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .oneshot(json_request(
            "PUT",
            "/api/models/current",
            serde_json::json!({ "model": "gpt-9" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_over_http() {
    let tmp = TempDir::new().unwrap();
    let chat = service(tmp.path(), None).await;
    let session = chat.sessions().create_session().await;
    let app = server::router(chat.clone());

    let upload = |name: &str, body: Vec<u8>| {
        Request::builder()
            .method("POST")
            .uri(format!(
                "/api/sessions/{}/upload?filename={}",
                session.id, name
            ))
            .body(Body::from(body))
            .unwrap()
    };

    let res = app
        .clone()
        .oneshot(upload("notes.md", b"# Notes\nremember the milk".to_vec()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let out = body_json(res).await;
    assert_eq!(out["filename"], "notes.md");
    assert_eq!(out["message"]["kind"], "system");
    assert!(out["preview"].as_str().unwrap().contains("remember the milk"));

    let res = app
        .clone()
        .oneshot(upload("photo.png", b"data".to_vec()))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .clone()
        .oneshot(upload("big.txt", vec![b'a'; 2048]))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_json(res).await["error"]["code"], "payload_too_large");

    let res = app
        .oneshot(upload("bad.txt", vec![0xff, 0xfe, 0xfd]))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let messages = chat.sessions().messages(&session.id, None).await;
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn test_preferences_and_export_over_http() {
    let tmp = TempDir::new().unwrap();
    let chat = service(tmp.path(), None).await;
    let session = chat.sessions().create_session().await;
    let app = server::router(chat);

    let res = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/sessions/{}/preferences", session.id),
            serde_json::json!({ "theme": "dark", "export_format": "md" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let prefs = body_json(res).await;
    assert_eq!(prefs["theme"], "dark");
    assert_eq!(prefs["export_format"], "md");
    assert_eq!(prefs["auto_scroll"], true);

    let res = app
        .clone()
        .oneshot(empty_request(
            "GET",
            &format!("/api/sessions/{}/export", session.id),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()[header::CONTENT_TYPE],
        "text/markdown; charset=utf-8"
    );
    let disposition = res.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"chat_"));
    assert!(disposition.ends_with(".md\""));
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8(bytes.to_vec())
        .unwrap()
        .starts_with("# Chat Session Export"));

    let res = app
        .clone()
        .oneshot(empty_request(
            "GET",
            &format!("/api/sessions/{}/export?format=xml", session.id),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .clone()
        .oneshot(empty_request("GET", "/api/themes"))
        .await
        .unwrap();
    let themes = body_json(res).await;
    assert_eq!(themes.as_array().unwrap().len(), 3);
    assert_eq!(themes[1]["name"], "dark");
    assert_eq!(themes[1]["primary_color"], "#00D4AA");

    let res = app
        .oneshot(empty_request("GET", "/api/examples"))
        .await
        .unwrap();
    assert_eq!(body_json(res).await.as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_close_live_session_over_http() {
    let tmp = TempDir::new().unwrap();
    let chat = service(tmp.path(), None).await;
    let session = chat.sessions().create_session().await;
    let app = server::router(chat.clone());

    let uri = format!("/api/sessions/{}", session.id);
    let res = app
        .clone()
        .oneshot(empty_request("DELETE", &uri))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["closed"], session.id.as_str());
    assert!(chat.sessions().is_empty().await);

    let res = app.oneshot(empty_request("DELETE", &uri)).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(res).await["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_extractor_rejections_use_error_envelope() {
    let tmp = TempDir::new().unwrap();
    let chat = service(tmp.path(), None).await;
    let session = chat.sessions().create_session().await;
    let app = server::router(chat);

    let res = app
        .clone()
        .oneshot(empty_request("GET", "/api/search"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"]["code"], "bad_request");

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/sessions/{}/messages", session.id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = body_json(res).await;
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(!body["error"]["message"].as_str().unwrap().is_empty());

    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/sessions/{}/upload", session.id))
                .body(Body::from("hello"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"]["code"], "bad_request");

    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!(
                    "/api/sessions/{}/upload?filename=huge.txt",
                    session.id
                ))
                .body(Body::from(vec![b'a'; 128 * 1024]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_json(res).await["error"]["code"], "payload_too_large");
}

#[tokio::test]
async fn test_analyze_over_http() {
    let tmp = TempDir::new().unwrap();
    let app = server::router(service(tmp.path(), None).await);

    let res = app
        .oneshot(json_request(
            "POST",
            "/api/analyze",
            serde_json::json!({ "content": "What is 12 + 30 in France?\n```py\nprint(1)\n```" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["parsed"]["intent"], "question");
    assert_eq!(body["parsed"]["entities"]["numbers"][0], "12");
    assert_eq!(body["parsed"]["entities"]["countries"][0], "France");
    assert_eq!(body["suggestions"].as_array().unwrap().len(), 3);
    assert_eq!(body["code_blocks"][0]["language"], "py");
    assert_eq!(body["code_blocks"][0]["code"], "print(1)");
}
