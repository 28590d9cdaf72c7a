use http::StatusCode;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::client::{FetchError, HttpReply, Transport};
use crate::models::telemetry::DeviceId;
use crate::session::Session;
use crate::utils::lock;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
}

#[derive(Default)]
struct State {
    replies: HashMap<(&'static str, String), (u16, String)>,
    requests: Vec<RecordedRequest>,
}

/// In-memory transport. Unregistered URLs fail like an unreachable host.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<State>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_get(&self, url: &str, status: u16, body: &str) {
        lock(&self.state)
            .replies
            .insert(("GET", url.to_string()), (status, body.to_string()));
    }

    pub fn reply_post(&self, url: &str, status: u16, body: &str) {
        lock(&self.state)
            .replies
            .insert(("POST", url.to_string()), (status, body.to_string()));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state).requests.clone()
    }

    fn answer(&self, request: RecordedRequest) -> Result<HttpReply, FetchError> {
        let mut state = lock(&self.state);
        let key = (request.method, request.url.clone());
        state.requests.push(request);
        match state.replies.get(&key) {
            Some((status, body)) => Ok(HttpReply {
                status: StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                body: body.clone(),
            }),
            None => Err(FetchError::Network(format!("connection refused: {}", key.1))),
        }
    }
}

impl Transport for FakeTransport {
    fn get(&self, url: &str, bearer: Option<&str>) -> Result<HttpReply, FetchError> {
        self.answer(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            bearer: bearer.map(str::to_string),
            body: None,
        })
    }

    fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply, FetchError> {
        self.answer(RecordedRequest {
            method: "POST",
            url: url.to_string(),
            bearer: None,
            body: Some(body.clone()),
        })
    }
}

pub fn session(device_id: &str, token: &str) -> Session {
    Session {
        device_id: DeviceId::parse(device_id).expect("valid device id"),
        token: token.to_string(),
    }
}

pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/data/{name}")).expect("fixture present")
}
