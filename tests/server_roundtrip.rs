mod common;

use cat_mt_assist::{HttpChannel, Message, MessageChannel, StorageArea};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn spawn_server(storage: &StorageArea, upstream: &str) -> String {
    let app = cat_mt_assist::server::router(common::mock_coordinator(storage, upstream));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn http_channel_carries_replies_in_band() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "早上好"}}]
        })))
        .mount(&upstream)
        .await;
    let storage = StorageArea::in_memory("local");
    storage.set_one("deepseek_apiKey", json!("sk")).unwrap();
    let base = spawn_server(&storage, &upstream.uri()).await;
    let channel = HttpChannel::new(&base);

    let reply = channel
        .send(Message::translate("deepseek", "Good morning", Vec::new(), None))
        .await
        .unwrap();
    assert_eq!(reply.translation.as_deref(), Some("早上好"));

    let reply = channel
        .send(Message::translate("deepseek", "  ", Vec::new(), None))
        .await
        .unwrap();
    assert_eq!(reply.error.as_deref(), Some("No text provided."));

    let reply = channel.send(Message::query_service("google")).await.unwrap();
    assert_eq!(reply.ok, Some(false));
}

#[tokio::test]
async fn raw_endpoints_answer_with_cors() {
    let upstream = MockServer::start().await;
    let storage = StorageArea::in_memory("local");
    storage.set_one("google_apiKey", json!("g")).unwrap();
    let base = spawn_server(&storage, &upstream.uri()).await;
    let client = reqwest::Client::new();

    let health = client.get(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(
        health
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    assert_eq!(health.json::<Value>().await.unwrap(), json!({"status": "ok"}));

    let preflight = client
        .request(reqwest::Method::OPTIONS, format!("{}/message", base))
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), reqwest::StatusCode::NO_CONTENT);

    let garbage = client
        .post(format!("{}/message", base))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(garbage.status(), reqwest::StatusCode::OK);
    let reply: Value = garbage.json().await.unwrap();
    assert!(reply["error"].as_str().unwrap().starts_with("Invalid message:"));

    let unknown = client
        .post(format!("{}/message", base))
        .json(&json!({"action": "ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(
        unknown.json::<Value>().await.unwrap(),
        json!({"error": "Unknown action: ping"})
    );

    let services: Value = client
        .get(format!("{}/services", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ids = services
        .as_array()
        .unwrap()
        .iter()
        .map(|s| (s["id"].as_str().unwrap(), s["configured"].as_bool().unwrap()))
        .collect::<Vec<_>>();
    assert_eq!(
        ids,
        vec![
            ("deepseek", false),
            ("deepl", false),
            ("google", true),
            ("openai", false)
        ]
    );

    let page = client
        .get(format!("{}/popup", base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains("Check usage in your Google Cloud dashboard"));
}
