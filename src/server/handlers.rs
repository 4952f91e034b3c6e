use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::client::render_popup_html;
use super::state::ServerState;
use crate::coordinator::{Coordinator, Reply};
use crate::popup::Popup;
use crate::providers::Provider;

pub fn router(coordinator: Coordinator) -> Router {
    let state = Arc::new(ServerState { coordinator });
    Router::new()
        .route("/health", get(health))
        .route("/message", post(message))
        .route("/services", get(services))
        .route("/popup", get(popup))
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware))
}

pub async fn run_server(coordinator: Coordinator, addr: String) -> Result<()> {
    let app = router(coordinator);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind server address: {}", addr))?;
    tracing::info!("listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type"),
    );
}

/// Errors travel inside the reply, so this always answers 200.
async fn message(State(state): State<Arc<ServerState>>, body: Bytes) -> Json<Reply> {
    let reply = match serde_json::from_slice::<Value>(&body) {
        Ok(value) => state.coordinator.handle_value(value).await,
        Err(err) => Reply::failed(format!("Invalid message: {}", err)),
    };
    Json(reply)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceInfo {
    id: String,
    label: &'static str,
    query_cacheable: bool,
    configured: bool,
}

async fn services(State(state): State<Arc<ServerState>>) -> Json<Vec<ServiceInfo>> {
    let registry = state.coordinator.context().registry();
    let services = registry
        .list()
        .into_iter()
        .map(|entry| ServiceInfo {
            id: entry.kind.as_str().to_string(),
            label: entry.metadata.label,
            query_cacheable: entry.metadata.query_cacheable,
            configured: entry.provider.is_configured().unwrap_or(false),
        })
        .collect();
    Json(services)
}

#[derive(Debug, Default, Deserialize)]
struct PopupQuery {
    #[serde(default)]
    refresh: bool,
}

async fn popup(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<PopupQuery>,
) -> Result<Html<String>, (StatusCode, String)> {
    let coordinator = &state.coordinator;
    let storage = coordinator.context().storage().clone();
    let cards = Popup::new(storage, coordinator).cards(query.refresh).await;
    render_popup_html(&cards)
        .map(Html)
        .map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")))
}
