//! reqwest-backed [`HttpClient`]
//!
//! Bodies are handed to the core exactly as received: no automatic
//! decompression (the core decodes `Content-Encoding` itself) and no
//! redirect following (a `Location` on a 404 is protocol data).

use std::time::Duration;

use async_trait::async_trait;
use mispsync_core::{HttpClient, HttpRequest, HttpResponse, Method, TransportError};
use tokio_util::sync::CancellationToken;
use tracing::trace;

pub struct ReqwestClient {
    client: reqwest::Client,
    cancel: CancellationToken,
}

impl ReqwestClient {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, cancel })
    }

    async fn exchange(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))?;

        trace!(status, bytes = body.len(), "Response received");
        Ok(HttpResponse::new(status, headers, body))
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(TransportError::Cancelled),
            result = self.exchange(request) => result,
        }
    }
}
