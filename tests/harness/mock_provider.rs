//! Mock image providers for integration tests
//!
//! Serves an OpenAI-compatible images endpoint and a Replicate-style
//! prediction API from one ephemeral port

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde_json::{Value, json};
use tokio::task::JoinHandle;

/// What the images endpoint answers with
#[derive(Clone)]
pub enum ImageReply {
    Url(String),
    Base64(String),
    Status(u16, String),
    Raw(String),
}

pub struct MockProvider {
    addr: SocketAddr,
    state: Arc<MockState>,
    task: JoinHandle<()>,
}

pub struct MockState {
    base_url: String,
    events: Arc<Mutex<Vec<String>>>,
    image_reply: Mutex<ImageReply>,
    image_requests: Mutex<Vec<(Value, Option<String>)>>,
    prediction_requests: Mutex<Vec<(Value, Option<String>)>>,
    poll_script: Mutex<VecDeque<Value>>,
    polls: AtomicU32,
}

impl MockProvider {
    /// Start the mock server; `events` receives `create` and `poll` entries
    pub async fn start(events: Arc<Mutex<Vec<String>>>) -> anyhow::Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = Arc::new(MockState {
            base_url: format!("http://{addr}"),
            events,
            image_reply: Mutex::new(ImageReply::Url(
                "https://images.example.com/default.png".to_string(),
            )),
            image_requests: Mutex::new(Vec::new()),
            prediction_requests: Mutex::new(Vec::new()),
            poll_script: Mutex::new(VecDeque::new()),
            polls: AtomicU32::new(0),
        });

        let app = Router::new()
            .route("/v1/images/generations", routing::post(handle_images))
            .route(
                "/v1/models/{owner}/{name}/predictions",
                routing::post(handle_create_prediction),
            )
            .route("/v1/predictions/{id}", routing::get(handle_poll))
            .with_state(state.clone());

        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { addr, state, task })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn reply_with(&self, reply: ImageReply) {
        *self.state.image_reply.lock().unwrap() = reply;
    }

    /// Queue prediction states returned by successive polls; once drained the
    /// prediction stays `processing`
    pub fn script_polls(&self, states: Vec<Value>) {
        self.state.poll_script.lock().unwrap().extend(states);
    }

    pub fn image_requests(&self) -> Vec<(Value, Option<String>)> {
        self.state.image_requests.lock().unwrap().clone()
    }

    pub fn prediction_requests(&self) -> Vec<(Value, Option<String>)> {
        self.state.prediction_requests.lock().unwrap().clone()
    }

    pub fn polls(&self) -> u32 {
        self.state.polls.load(Ordering::SeqCst)
    }
}

impl Drop for MockProvider {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Build a prediction state as the status endpoint would report it
pub fn prediction(status: &str, output: Option<&str>, error: Option<&str>) -> Value {
    json!({
        "id": "pred-1",
        "status": status,
        "output": output,
        "error": error,
    })
}

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn handle_images(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state
        .image_requests
        .lock()
        .unwrap()
        .push((body, authorization(&headers)));

    let reply = state.image_reply.lock().unwrap().clone();
    match reply {
        ImageReply::Url(url) => Json(json!({"created": 1, "data": [{"url": url}]})).into_response(),
        ImageReply::Base64(payload) => {
            Json(json!({"created": 1, "data": [{"b64_json": payload}]})).into_response()
        }
        ImageReply::Status(status, body) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        )
            .into_response(),
        ImageReply::Raw(body) => (StatusCode::OK, body).into_response(),
    }
}

async fn handle_create_prediction(
    State(state): State<Arc<MockState>>,
    Path((owner, name)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.events.lock().unwrap().push(format!("create {owner}/{name}"));
    state
        .prediction_requests
        .lock()
        .unwrap()
        .push((body, authorization(&headers)));

    (
        StatusCode::CREATED,
        Json(json!({
            "id": "pred-1",
            "status": "starting",
            "output": null,
            "urls": {"get": format!("{}/v1/predictions/pred-1", state.base_url)},
        })),
    )
        .into_response()
}

async fn handle_poll(State(state): State<Arc<MockState>>, Path(id): Path<String>) -> Response {
    state.polls.fetch_add(1, Ordering::SeqCst);
    state.events.lock().unwrap().push("poll".to_string());

    let next = state.poll_script.lock().unwrap().pop_front();
    let body = next.unwrap_or_else(|| json!({"id": id, "status": "processing"}));
    Json(body).into_response()
}
