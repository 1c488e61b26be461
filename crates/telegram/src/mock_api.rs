//! Local stand-in for the Bot API used by the tests in this crate.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use {
    axum::{
        Json, Router,
        body::Bytes,
        extract::State,
        http::{StatusCode, Uri},
        routing::post,
    },
    serde_json::Value,
    teloxide::Bot,
};

type Responder = Arc<dyn Fn(&str, &Value) -> Value + Send + Sync>;

#[derive(Clone)]
struct MockState {
    responder: Responder,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

pub(crate) struct MockApi {
    addr: std::net::SocketAddr,
    state: MockState,
}

impl MockApi {
    /// Serve API methods with `responder(method, request_body)`, which returns
    /// the full response envelope.
    pub(crate) async fn spawn(
        responder: impl Fn(&str, &Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        let state = MockState {
            responder: Arc::new(responder),
            calls: Arc::default(),
            files: Arc::default(),
        };
        let app = Router::new()
            .route("/{*path}", post(api_method).get(download))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock telegram api");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub(crate) fn bot(&self) -> Bot {
        let url = reqwest::Url::parse(&format!("http://{}/", self.addr)).expect("api url");
        Bot::new("test-token").set_api_url(url)
    }

    /// Serve `bytes` at the file path `path`.
    pub(crate) fn put_file(&self, path: &str, bytes: &[u8]) {
        self.state
            .files
            .lock()
            .expect("files lock")
            .insert(path.to_string(), bytes.to_vec());
    }

    /// Request bodies received for `method`, in order.
    pub(crate) fn calls(&self, method: &str) -> Vec<Value> {
        self.state
            .calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

async fn api_method(State(state): State<MockState>, uri: Uri, body: Bytes) -> Json<Value> {
    let method = uri.path().rsplit('/').next().unwrap_or_default().to_string();
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let response = (state.responder)(&method, &body);
    state
        .calls
        .lock()
        .expect("calls lock")
        .push((method, body));
    Json(response)
}

/// `GET /file/bot<token>/<path>`
async fn download(
    State(state): State<MockState>,
    uri: Uri,
) -> Result<Vec<u8>, StatusCode> {
    let path = uri
        .path()
        .strip_prefix("/file/bottest-token/")
        .ok_or(StatusCode::NOT_FOUND)?;
    state
        .files
        .lock()
        .expect("files lock")
        .get(path)
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)
}
