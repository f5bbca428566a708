//! Test utilities: a scripted assistant backend on a local port.
#![allow(dead_code, clippy::field_reassign_with_default)]

use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use fairchat::config::{AuthContext, ServerConfig};
use fairchat::{AppConfig, Conversation, ConversationOptions, HttpTransport, SessionManager};
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Value, json};
use tokio::task::JoinHandle;

/// What the fake backend answers with.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Raw body chunks written on the streaming endpoints.
    pub chunks: Vec<Vec<u8>>,
    /// Keep the stream open after the chunks instead of ending it.
    pub hang: bool,
    /// Fail every chat endpoint with this status and `{"detail": ...}`.
    pub failure: Option<(StatusCode, String)>,
    /// Body of `response` on the single-shot endpoint.
    pub reply: String,
}

impl Script {
    pub fn streaming(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
            ..Self::default()
        }
    }
}

/// One request received by the fake backend.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub body: Value,
    pub authorization: Option<String>,
    pub organization: Option<String>,
}

struct FakeState {
    script: Script,
    requests: Mutex<Vec<Recorded>>,
}

impl FakeState {
    fn record(&self, path: impl Into<String>, headers: &HeaderMap, body: Value) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.requests.lock().unwrap().push(Recorded {
            path: path.into(),
            body,
            authorization: header("authorization"),
            organization: header("x-organization-id"),
        });
    }

    fn failure(&self) -> Option<Response> {
        self.script
            .failure
            .as_ref()
            .map(|(status, detail)| (*status, Json(json!({ "detail": detail }))).into_response())
    }
}

pub struct FakeBackend {
    pub url: String,
    state: Arc<FakeState>,
    handle: JoinHandle<()>,
}

impl FakeBackend {
    pub async fn start(script: Script) -> Self {
        let state = Arc::new(FakeState {
            script,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
            .route("/chat/send", post(single_shot))
            .route("/chat/send/stream", post(stream_reply))
            .route("/chat/analyze-model/stream", post(stream_reply))
            .route("/chat/session/{session_id}/context", get(session_context))
            .route("/chat/clear-session/{session_id}", post(clear_session))
            .route("/chat/models/{model_id}/github-url", get(model_github_url))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test backend");
        });

        Self {
            url: format!("http://{addr}"),
            state,
            handle,
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn config(&self) -> AppConfig {
        let mut config = AppConfig::default();
        config.server = ServerConfig {
            url: self.url.clone(),
            connect_timeout_secs: 2,
            request_timeout_secs: 5,
        };
        config
    }

    pub fn transport(&self, auth: AuthContext) -> HttpTransport {
        HttpTransport::new(&self.config().server, auth).expect("build transport")
    }

    pub fn conversation(&self, options: ConversationOptions) -> Conversation<HttpTransport> {
        Conversation::new(
            self.transport(AuthContext::default()),
            self.config().endpoints,
            SessionManager::new("7"),
            options,
        )
    }
}

/// Conversation pointed at a port nothing listens on.
pub fn unreachable_conversation(options: ConversationOptions) -> Conversation<HttpTransport> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind throwaway listener");
    let addr = listener.local_addr().expect("throwaway address");
    drop(listener);

    let mut config = AppConfig::default();
    config.server.url = format!("http://{addr}");
    config.server.connect_timeout_secs = 2;
    let transport =
        HttpTransport::new(&config.server, AuthContext::default()).expect("build transport");
    Conversation::new(transport, config.endpoints, SessionManager::new("7"), options)
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn stream_reply(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    uri: axum::http::Uri,
    Json(body): Json<Value>,
) -> Response {
    state.record(uri.path(), &headers, body);
    if let Some(response) = state.failure() {
        return response;
    }

    let chunks = stream::iter(
        state
            .script
            .chunks
            .clone()
            .into_iter()
            .map(Ok::<_, Infallible>),
    );
    let body: BoxStream<'static, Result<Vec<u8>, Infallible>> = if state.script.hang {
        chunks.chain(stream::pending()).boxed()
    } else {
        chunks.boxed()
    };

    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(body),
    )
        .into_response()
}

async fn single_shot(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let session_id = body.get("session_id").cloned().unwrap_or(Value::Null);
    state.record("/chat/send", &headers, body);
    if let Some(response) = state.failure() {
        return response;
    }
    Json(json!({
        "response": state.script.reply,
        "github_code_analyzed": false,
        "files_fetched": [],
        "session_id": session_id,
    }))
    .into_response()
}

async fn session_context(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Response {
    state.record(format!("/chat/session/{session_id}/context"), &headers, Value::Null);
    Json(json!({
        "has_github_code": true,
        "files_fetched": ["train.py", "model/fairness.py"],
        "model_info": { "name": "credit-scorer", "type": "classification" },
        "conversation_length": 4,
    }))
    .into_response()
}

async fn clear_session(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Response {
    state.record(format!("/chat/clear-session/{session_id}"), &headers, Value::Null);
    Json(json!({ "message": format!("Session {session_id} cleared") })).into_response()
}

async fn model_github_url(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Path(model_id): Path<i64>,
) -> Response {
    state.record(format!("/chat/models/{model_id}/github-url"), &headers, Value::Null);
    match model_id {
        7 => Json(json!({ "github_url": "https://github.com/acme/credit-scorer" })).into_response(),
        8 => Json(json!({ "github_url": null })).into_response(),
        _ => (StatusCode::NOT_FOUND, Json(json!({ "detail": "Model not found" }))).into_response(),
    }
}
