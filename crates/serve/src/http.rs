use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path as AxumPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use serve_dispatcher::{AcceptOutcome, Dispatcher};
use serve_ledger::TransportHeaders;
use serve_types::{EventSource, RpcRequest, RpcResponse};
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::rpc_dispatch::dispatch;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub keepalive: Duration,
    pub max_body_bytes: usize,
}

/// Builds the ingress/RPC/health surface.
pub fn router(state: AppState) -> Router {
    let max_body_bytes = state.max_body_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/ingress/:provider/webhook", post(ingress_webhook))
        .route("/rpc", post(rpc_call))
        .route("/rpc/stream", get(rpc_stream))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({"status": "ok", "snapshot": state.dispatcher.status()}))
}

async fn ingress_webhook(
    State(state): State<AppState>,
    AxumPath(provider): AxumPath<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Response {
    let source = match provider.as_str() {
        "github" => EventSource::Github,
        "timer" => EventSource::Timer,
        _ => EventSource::Serve,
    };
    let transport_headers = TransportHeaders {
        delivery_id: header_str(&headers, "x-github-delivery"),
        event_hint: header_str(&headers, "x-github-event"),
    };

    match state.dispatcher.accept(source, payload, transport_headers).await {
        Ok(outcome) => {
            let body = match outcome {
                AcceptOutcome::Forwarded => json!({"accepted": true}),
                AcceptOutcome::Duplicate => json!({"accepted": true, "duplicate": true}),
                AcceptOutcome::LaneFull => json!({"accepted": true, "queued": false, "reason": "lane_full"}),
                AcceptOutcome::NormalizeFailed => {
                    json!({"accepted": true, "queued": false, "reason": "normalize_failed"})
                }
            };
            (StatusCode::ACCEPTED, Json(body)).into_response()
        }
        Err(err) => {
            warn!(error = %err, "ingress accept failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": err.to_string()}))).into_response()
        }
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

async fn rpc_call(State(state): State<AppState>, body: Body) -> Response {
    let bytes = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return (
                StatusCode::OK,
                Json(RpcResponse::err(Value::Null, serve_types::RpcError::parse_error())),
            )
                .into_response()
        }
    };

    let request: RpcRequest = match serde_json::from_slice(&bytes) {
        Ok(request) => request,
        Err(_) => {
            return (
                StatusCode::OK,
                Json(RpcResponse::err(Value::Null, serve_types::RpcError::parse_error())),
            )
                .into_response()
        }
    };

    let result = dispatch(&state.dispatcher, &request.method, request.params).await;
    let response = match result {
        Ok(value) => RpcResponse::ok(request.id, value),
        Err(err) => RpcResponse::err(request.id, err),
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// Streams NDJSON lifecycle notifications plus periodic keepalive blank
/// lines so idle connections aren't reaped by intermediate proxies.
async fn rpc_stream(State(state): State<AppState>) -> Response {
    let (_id, rx) = state.dispatcher.notifier().subscribe();
    let merged = merge_with_keepalive(rx, state.keepalive);
    let stream = ReceiverStream::new(merged).map(Ok::<_, std::io::Error>);
    let body = Body::from_stream(stream);

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/x-ndjson")
        .body(body)
        .expect("static response parts are always valid")
}

/// Merges a notification receiver with a keepalive ticker into a single
/// stream of NDJSON lines (notifications) and blank lines (keepalives).
fn merge_with_keepalive(
    mut notifications: mpsc::Receiver<serve_types::Notification>,
    keepalive: Duration,
) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let mut ticker = interval(keepalive);
        loop {
            tokio::select! {
                biased;
                maybe = notifications.recv() => {
                    match maybe {
                        Some(n) => {
                            if tx.send(n.to_ndjson_line()).await.is_err() {
                                return;
                            }
                        }
                        None => return,
                    }
                }
                _ = ticker.tick() => {
                    if tx.send("\n".to_string()).await.is_err() {
                        return;
                    }
                }
            }
        }
    });
    rx
}
