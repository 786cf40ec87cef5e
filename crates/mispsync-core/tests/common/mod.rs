//! Shared test fixtures: a scripted in-memory peer
//!
//! `MockPeer` implements `HttpClient`. Each route (method + path) holds a
//! queue of replies; the last reply of a queue repeats. Requests without a
//! route get a 501. Every request is recorded for later assertions.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use mispsync_core::{
    AuthKey, HttpClient, HttpRequest, HttpResponse, Method, PeerDescriptor, SyncConfig,
    SyncTransport, TransportError,
};

pub const BASE_URL: &str = "https://peer.example";
pub const INFO_PATH: &str = "/servers/getVersion";

#[derive(Debug, Clone)]
pub enum Reply {
    Respond(HttpResponse),
    Fail(TransportError),
}

struct Route {
    method: Method,
    path: String,
    replies: VecDeque<Reply>,
}

#[derive(Default)]
pub struct MockPeer {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

pub fn json_response(status: u16, body: Value) -> HttpResponse {
    HttpResponse::new(
        status,
        vec![("Content-Type".to_string(), "application/json".to_string())],
        serde_json::to_vec(&body).unwrap(),
    )
}

impl MockPeer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Peer whose info endpoint reports `info`
    pub fn with_info(info: Value) -> Arc<Self> {
        let peer = Self::new();
        peer.on(Method::Get, INFO_PATH, json_response(200, info));
        peer
    }

    pub fn on(&self, method: Method, path: &str, response: HttpResponse) -> &Self {
        self.push(method, path, Reply::Respond(response))
    }

    pub fn on_json(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        self.on(method, path, json_response(status, body))
    }

    pub fn fail(&self, method: Method, path: &str, error: TransportError) -> &Self {
        self.push(method, path, Reply::Fail(error))
    }

    fn push(&self, method: Method, path: &str, reply: Reply) -> &Self {
        let mut routes = self.routes.lock();
        match routes
            .iter_mut()
            .find(|r| r.method == method && r.path == path)
        {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(Route {
                method,
                path: path.to_string(),
                replies: VecDeque::from([reply]),
            }),
        }
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Requests as `"METHOD /path"` strings, in order
    pub fn log(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|r| format!("{} {}", r.method, relative(&r.url)))
            .collect()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method && relative(&r.url) == path)
            .count()
    }

    pub fn last_request_to(&self, method: Method, path: &str) -> Option<HttpRequest> {
        self.requests
            .lock()
            .iter()
            .rev()
            .find(|r| r.method == method && relative(&r.url) == path)
            .cloned()
    }
}

fn relative(url: &str) -> &str {
    url.strip_prefix(BASE_URL).unwrap_or(url)
}

#[async_trait]
impl HttpClient for MockPeer {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = request.method;
        let path = relative(&request.url).to_string();
        self.requests.lock().push(request);

        let mut routes = self.routes.lock();
        let Some(route) = routes
            .iter_mut()
            .find(|r| r.method == method && r.path == path)
        else {
            return Ok(HttpResponse::status_only(501));
        };

        let reply = if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            route.replies.front().cloned()
        };
        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Fail(error)) => Err(error),
            None => Ok(HttpResponse::status_only(501)),
        }
    }
}

pub fn peer_descriptor() -> PeerDescriptor {
    PeerDescriptor::new(3, "partner", BASE_URL, AuthKey::new("test-key")).unwrap()
}

pub fn transport(mock: &Arc<MockPeer>) -> SyncTransport {
    transport_with(mock, SyncConfig::default())
}

pub fn transport_with(mock: &Arc<MockPeer>, config: SyncConfig) -> SyncTransport {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    SyncTransport::new(peer_descriptor(), config, mock.clone()).unwrap()
}

/// Decode a JSON request body (uncompressed requests only)
pub fn body_json(request: &HttpRequest) -> Value {
    serde_json::from_slice(request.body.as_deref().unwrap_or(b"null")).unwrap()
}
