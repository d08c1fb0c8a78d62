//! `/agents/<path>` router: append via POST, hydrate + follow via SSE GET.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{
        sse::{Event as SseEvent, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::{get, post},
    Json, Router,
};
use broker_stream::{ReadRange, StreamManager, SubscribeFrom};
use event_types::{EventInput, Offset, StreamPath};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<StreamManager>,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/agents/{*path}", post(handle_append))
        .route("/agents/{*path}", get(handle_stream))
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ReadQuery {
    pub offset: Option<String>,
    pub live: Option<String>,
}

async fn handle_append(
    State(state): State<AppState>,
    Path(path): Path<String>,
    body: axum::body::Bytes,
) -> Response {
    let path = match StreamPath::new(path) {
        Ok(p) => p,
        Err(e) => return bad_request(e.to_string()),
    };

    let input: EventInput = match serde_json::from_slice(&body) {
        Ok(input) => input,
        Err(e) => return bad_request(e.to_string()),
    };

    match state.manager.append(&path, input).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            warn!(path = %path, error = %e, "append failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

/// `GET /agents/<path>`: history, then live, over SSE. `offset` is the
/// exclusive starting point; absent it replays from `Offset::none()`.
/// `live=false` returns the history-only prefix and closes the stream;
/// any other value (including absent, `sse`, `true`) follows live too.
async fn handle_stream(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Response {
    let path = match StreamPath::new(path) {
        Ok(p) => p,
        Err(e) => return bad_request(e.to_string()),
    };

    let from = match query.offset {
        Some(raw) => match raw.parse::<Offset>() {
            Ok(offset) => offset,
            Err(e) => return bad_request(e.to_string()),
        },
        None => Offset::none(),
    };

    let history_only = matches!(query.live.as_deref(), Some("false"));

    let stream = match state.manager.for_path(&path).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(path = %path, error = %e, "failed to open stream for subscriber");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() }))).into_response();
        }
    };

    let sse_stream = stream
        .subscribe(SubscribeFrom {
            from: Some(from),
            history_only,
            live_only: false,
        })
        .map(|event| {
            let data = serde_json::to_string(&event).expect("events always serialize");
            Ok::<_, Infallible>(SseEvent::default().event("data").data(data))
        });

    Sse::new(sse_stream)
        .keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15)).text("keepalive"))
        .into_response()
}

/// Historical-only read for callers that do not want a live connection
/// (not exposed as its own route; used by the CLI's health checks and
/// by the SSE handler's underlying implementation).
#[allow(dead_code)]
async fn read_history(state: &AppState, path: &StreamPath) -> Result<Vec<event_types::Event>, broker_stream::StorageFailure> {
    state.manager.read(Some(path), ReadRange::default()).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use broker_stream::InMemoryStorage;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        let manager = StreamManager::new(Arc::new(InMemoryStorage::new()));
        create_router(AppState { manager })
    }

    #[tokio::test]
    async fn post_invalid_json_returns_400_with_error_body() {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/agents/chat/room1")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json.get("error").is_some());
    }

    #[tokio::test]
    async fn post_valid_event_returns_204() {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/agents/chat/room1")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(r#"{"type":"message","payload":{"text":"hi"}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn get_streams_appended_event_as_sse_data_record() {
        let manager = StreamManager::new(Arc::new(InMemoryStorage::new()));
        let path = StreamPath::new("chat/room1").unwrap();
        let state = AppState { manager: manager.clone() };
        let router = create_router(state);

        let server = tokio::spawn(async move {
            router
                .oneshot(
                    axum::http::Request::builder()
                        .method("GET")
                        .uri("/agents/chat/room1")
                        .body(axum::body::Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap()
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        manager
            .append(
                &path,
                EventInput::new(
                    event_types::EventType::new("message").unwrap(),
                    serde_json::Map::from_iter([("text".to_string(), serde_json::Value::from("Hello SSE!"))]),
                ),
            )
            .await
            .unwrap();

        let response = server.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.starts_with("text/event-stream"));

        // The SSE body never ends (keep-alive), so read only the first
        // chunk rather than collecting the whole stream.
        let mut chunks = response.into_body().into_data_stream();
        let chunk = tokio::time::timeout(Duration::from_secs(1), chunks.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        assert!(text.contains("Hello SSE!"));
        assert!(text.contains("0000000000000000"));
    }

    #[tokio::test]
    async fn get_with_live_false_closes_after_history_without_hanging() {
        let manager = StreamManager::new(Arc::new(InMemoryStorage::new()));
        let path = StreamPath::new("chat/room1").unwrap();
        manager
            .append(
                &path,
                EventInput::new(
                    event_types::EventType::new("message").unwrap(),
                    serde_json::Map::from_iter([("text".to_string(), serde_json::Value::from("archived"))]),
                ),
            )
            .await
            .unwrap();

        let state = AppState { manager };
        let router = create_router(state);

        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .method("GET")
                    .uri("/agents/chat/room1?live=false")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = tokio::time::timeout(Duration::from_secs(1), response.into_body().collect())
            .await
            .unwrap()
            .unwrap()
            .to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("archived"));
    }
}
