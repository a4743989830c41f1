//! HTTP transport.
//!
//! - `POST /mcp`: one JSON-RPC message in the body, its reply as the
//!   response body; notifications are acknowledged with `202 Accepted`
//! - `GET /sse`: server-sent events, a `connected` event followed by periodic
//!   `heartbeat` events
//! - `GET /health`: liveness probe
//!
//! Requests are rate limited per client. A client names itself with the
//! `x-client-id` header; otherwise its IP address is used.

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures::Stream;
use serde_json::json;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{debug, info};

use crate::mcp::protocol::{JsonRpcError, MAX_MESSAGE_BYTES, SERVER_NAME};
use crate::mcp::server::MessageHandler;

/// Header a client may use to identify itself for rate limiting.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Identity used when neither a header nor a peer address is available.
const ANONYMOUS_CLIENT: &str = "http-anonymous";

#[derive(Clone)]
struct HttpState {
    handler: Arc<dyn MessageHandler>,
    heartbeat: Duration,
}

/// Builds the router serving `handler`.
pub fn router(handler: Arc<dyn MessageHandler>, heartbeat: Duration) -> Router {
    Router::new()
        .route("/mcp", post(post_message))
        .route("/sse", get(event_stream))
        .route("/health", get(health_check))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new())
                .on_response(DefaultOnResponse::new()),
        )
        .with_state(HttpState { handler, heartbeat })
}

/// Serves the HTTP transport on `addr` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve<S>(
    addr: SocketAddr,
    handler: Arc<dyn MessageHandler>,
    heartbeat: Duration,
    shutdown: S,
) -> io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP transport listening");

    axum::serve(
        listener,
        router(handler, heartbeat).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get(CLIENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| ANONYMOUS_CLIENT.to_string())
}

fn json_body(json: String) -> Response {
    ([(CONTENT_TYPE, "application/json")], json).into_response()
}

async fn post_message(State(state): State<HttpState>, request: Request) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_id = client_id(request.headers(), peer);

    let bytes = match axum::body::to_bytes(request.into_body(), MAX_MESSAGE_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(client_id = %client_id, error = %e, "Rejected request body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let Ok(raw) = std::str::from_utf8(&bytes) else {
        return match serde_json::to_string(&JsonRpcError::parse_error()) {
            Ok(json) => json_body(json),
            Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        };
    };

    match state.handler.handle(raw, &client_id).await {
        Some(reply) => json_body(reply),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn event_stream(
    State(state): State<HttpState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let heartbeat = state.heartbeat;
    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data(
            json!({ "server": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") }).to_string(),
        ));

        let mut ticker = tokio::time::interval(heartbeat);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            yield Ok(Event::default()
                .event("heartbeat")
                .data(json!({ "timestamp": Utc::now().to_rfc3339() }).to_string()));
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

impl std::fmt::Debug for HttpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpState")
            .field("heartbeat", &self.heartbeat)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{self, Method};
    use futures::StreamExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    /// Replies with the client id unless the message mentions "notifications/".
    struct WhoAmI;

    #[async_trait]
    impl MessageHandler for WhoAmI {
        async fn handle(&self, raw: &str, client_id: &str) -> Option<String> {
            if raw.contains("notifications/") {
                return None;
            }
            Some(json!({ "client": client_id, "raw": raw }).to_string())
        }
    }

    fn app() -> Router {
        router(Arc::new(WhoAmI), Duration::from_secs(30))
    }

    fn post() -> http::request::Builder {
        http::Request::builder()
            .method(Method::POST)
            .uri("/mcp")
            .header(CONTENT_TYPE, "application/json")
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn post_returns_reply_as_json() {
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
        let response = app()
            .oneshot(post().body(Body::from(body)).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let json = body_json(response).await;
        assert_eq!(json["raw"], body);
        assert_eq!(json["client"], ANONYMOUS_CLIENT);
    }

    #[tokio::test]
    async fn client_header_sets_identity() {
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
        let response = app()
            .oneshot(
                post()
                    .header(CLIENT_ID_HEADER, "agent-7")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(response).await["client"], "agent-7");
    }

    #[test]
    fn peer_address_is_fallback_identity() {
        let peer: SocketAddr = "10.1.2.3:5555".parse().unwrap();
        assert_eq!(client_id(&HeaderMap::new(), Some(peer)), "10.1.2.3");

        let mut headers = HeaderMap::new();
        headers.insert(CLIENT_ID_HEADER, "  ".parse().unwrap());
        assert_eq!(client_id(&headers, Some(peer)), "10.1.2.3");
    }

    #[tokio::test]
    async fn notification_is_accepted_without_body() {
        let body = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        let response = app()
            .oneshot(post().body(Body::from(body)).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn non_utf8_body_is_a_parse_error() {
        let response = app()
            .oneshot(post().body(Body::from(vec![0xff, 0xfe, 0x00])).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], -32700);
        assert!(json["id"].is_null());
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = app()
            .oneshot(http::Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn sse_starts_with_connected_event() {
        let response = app()
            .oneshot(http::Request::builder().uri("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let mut frames = response.into_body().into_data_stream();
        let first = frames.next().await.unwrap().unwrap();
        let first = String::from_utf8(first.to_vec()).unwrap();
        assert!(first.contains("event: connected"), "{first}");
    }
}
