//! HTTP transport: JSON-RPC over POST plus an SSE stream for remote
//! clients. Stdio transport lives on [`crate::server::McpServer`] itself.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::mpsc;

use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::server::McpServer;

/// Shared transport state: the server plus a broadcast-ish channel for the
/// SSE stream.
pub struct HttpTransportState {
    server: McpServer,
}

/// Build the router.
pub fn create_router(server: McpServer) -> Router {
    Router::new()
        .route("/mcp", post(handle_post))
        .route("/sse", get(handle_sse))
        .route("/health", get(handle_health))
        .with_state(Arc::new(HttpTransportState { server }))
}

/// POST /mcp: one JSON-RPC request, one response.
async fn handle_post(
    State(state): State<Arc<HttpTransportState>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let response = state.server.handle_request(request).await;
    (StatusCode::OK, Json(response))
}

/// GET /sse: a keep-alive event stream. Requests still arrive via POST;
/// the stream exists so SSE-mode clients can hold a session open and
/// receive the endpoint announcement.
async fn handle_sse(State(_state): State<Arc<HttpTransportState>>) -> impl IntoResponse {
    let (event_tx, event_rx) = mpsc::channel::<Event>(16);

    let endpoint = Event::default().event("endpoint").data("/mcp");
    let _ = event_tx.send(endpoint).await;

    let stream = futures::stream::unfold(event_rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok::<_, Infallible>(event), rx))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(30))
            .text("ping"),
    )
}

async fn handle_health(State(state): State<Arc<HttpTransportState>>) -> impl IntoResponse {
    let online = state.server.dispatcher().state().data_session().is_some();
    Json(serde_json::json!({
        "status": "ok",
        "service": "quiver",
        "version": env!("CARGO_PKG_VERSION"),
        "data_backend": if online { "online" } else { "offline" }
    }))
}

/// Serve the HTTP transport until the listener fails.
pub async fn serve(server: McpServer, host: &str, port: u16) -> std::io::Result<()> {
    let app = create_router(server);
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!(host = %host, port = port, "MCP server listening over HTTP/SSE");
    axum::serve(listener, app).await
}
