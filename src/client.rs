//! HTTP client for the water-flow telemetry backend.
//!
//! - Blocking client using `ureq` (no async).
//! - One request per call: no caching, no retries. Callers decide what
//!   to do with a failure (panels keep their last good data).
//! - The wire is behind the `Transport` trait so tests can run without
//!   a server.
//!
//! Authentication
//! - `login` exchanges a device id and PIN for a JWT; every other call
//!   sends it as a bearer token.

use http::StatusCode;
use log::debug;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

use crate::endpoints::{self, EndpointTemplate};
use crate::models::telemetry::DeviceId;
use crate::models::wire::{LoginRequest, LoginResponse, RawPoint};
use crate::session::Session;
use crate::window::TimeWindow;

pub const DEFAULT_LOGIN_FAILURE: &str = "Login failed. Please try again.";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("network error: {0}")]
    Network(String),
    #[error("http {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("unexpected response shape at `{path}`: {message}")]
    Decode { path: String, message: String },
    #[error("bad endpoint: {0}")]
    Template(String),
}

impl FetchError {
    pub fn decode(path: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::Decode {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid device id: {0}")]
    InvalidDeviceId(String),
    #[error("{0}")]
    Rejected(String),
    #[error("login request failed: {0}")]
    Transport(#[from] FetchError),
    #[error("could not store session: {0}")]
    Storage(String),
}

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

pub trait Transport: Send + Sync {
    fn get(&self, url: &str, bearer: Option<&str>) -> Result<HttpReply, FetchError>;
    fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply, FetchError>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            // non-2xx bodies carry the backend's error message
            .http_status_as_error(false)
            .build()
            .into();
        UreqTransport { agent }
    }

    fn read(mut resp: http::Response<ureq::Body>) -> Result<HttpReply, FetchError> {
        let status = resp.status();
        let body = resp
            .body_mut()
            .read_to_string()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(HttpReply { status, body })
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str, bearer: Option<&str>) -> Result<HttpReply, FetchError> {
        let mut req = self.agent.get(url).header("Accept", "application/json");
        if let Some(token) = bearer {
            req = req.header("Authorization", format!("Bearer {}", token));
        }
        let resp = req.call().map_err(|e| FetchError::Network(e.to_string()))?;
        Self::read(resp)
    }

    fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpReply, FetchError> {
        let resp = self
            .agent
            .post(url)
            .header("Accept", "application/json")
            .send_json(body)
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Self::read(resp)
    }
}

pub struct TelemetryClient {
    base_url: String,
    transport: Box<dyn Transport>,
}

impl TelemetryClient {
    pub fn new(base_url: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        TelemetryClient { base_url, transport }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Exchanges credentials for a token. Any `{jwt}` in the body counts
    /// as success; otherwise the backend's `{error}` text is returned.
    pub fn login(&self, device_id: &DeviceId, pin: &str) -> Result<String, AuthError> {
        let body = serde_json::to_value(LoginRequest {
            device_id: device_id.as_str(),
            initial_pin: pin,
        })
        .map_err(|e| AuthError::Transport(FetchError::decode("$", e.to_string())))?;
        let reply = self.transport.post_json(&self.url(endpoints::LOGIN), &body)?;

        let parsed: LoginResponse = match decode(&reply.body) {
            Ok(parsed) => parsed,
            Err(e) if reply.status.is_success() => return Err(AuthError::Transport(e)),
            // a non-JSON error page still means "rejected"
            Err(_) => LoginResponse::default(),
        };
        match parsed {
            LoginResponse { jwt: Some(jwt), .. } if !jwt.is_empty() => Ok(jwt),
            LoginResponse { error: Some(msg), .. } if !msg.trim().is_empty() => Err(AuthError::Rejected(msg)),
            _ => Err(AuthError::Rejected(DEFAULT_LOGIN_FAILURE.to_string())),
        }
    }

    /// Performs one authenticated GET of `template` and decodes the body.
    pub fn fetch<T: DeserializeOwned>(
        &self,
        template: EndpointTemplate,
        session: &Session,
        window: Option<&TimeWindow>,
    ) -> Result<T, FetchError> {
        let path = template
            .render(&session.device_id, window)
            .map_err(FetchError::Template)?;
        let url = self.url(&path);
        debug!("GET {}", url);

        let reply = self.transport.get(&url, Some(&session.token))?;
        if !reply.status.is_success() {
            return Err(FetchError::Status {
                status: reply.status,
                body: reply.body,
            });
        }
        decode(&reply.body)
    }

    /// Flow readings for a window, in backend order.
    pub fn fetch_series(&self, session: &Session, window: &TimeWindow) -> Result<Vec<RawPoint>, FetchError> {
        self.fetch(endpoints::flow_series(window.granularity()), session, Some(window))
    }
}

/// Decodes JSON, reporting where in the document the shape diverged.
pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T, FetchError> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|e| {
        let path = e.path().to_string();
        FetchError::decode(path, e.into_inner().to_string())
    })
}
