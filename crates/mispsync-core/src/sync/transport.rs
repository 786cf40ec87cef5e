//! One peer connection: timed, audited HTTP exchanges
//!
//! [`SyncTransport`] owns everything tied to a single peer for the length
//! of a sync job: the descriptor, the immutable [`SyncConfig`], the HTTP
//! client, the optional signer and audit sink, and the [`VersionGate`]
//! holding the peer's capabilities. Protocols borrow it.
//!
//! ## Status handling
//!
//! | Call | Success | Otherwise |
//! |---|---|---|
//! | `get` | 2xx | `PeerHttp` error |
//! | `head` | 200 → `true`, 404 → `false` | `PeerHttp` error |
//! | `post` | 2xx, or 304 when a cache token was sent | `PeerHttp` error |

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::codec::{self, CompressionSupport, ContentEncoding};
use super::version_gate::{PeerCapabilities, VersionGate};
use crate::audit::{AuditSink, ExchangeRecord, PayloadRecord, TracingAuditSink};
use crate::config::SyncConfig;
use crate::error::{PeerHttpError, SyncError, SyncResult};
use crate::http::{header, HttpClient, HttpRequest, HttpResponse, Method, TransportError};
use crate::signer::Signer;
use crate::types::{Capability, PeerDescriptor};

const NOT_MODIFIED: u16 = 304;

/// Successful response from a peer
///
/// The body is kept as received; [`SyncResponse::json`] decompresses and
/// decodes it on demand.
#[derive(Debug, Clone)]
pub struct SyncResponse {
    method: Method,
    url: String,
    inner: HttpResponse,
}

impl SyncResponse {
    pub(crate) fn new(method: Method, url: String, inner: HttpResponse) -> Self {
        Self { method, url, inner }
    }

    pub fn status(&self) -> u16 {
        self.inner.status
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Body bytes as received, possibly compressed
    pub fn raw_body(&self) -> &[u8] {
        &self.inner.body
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.header(name)
    }

    pub fn content_encoding(&self) -> Option<&str> {
        self.inner.header(header::CONTENT_ENCODING)
    }

    /// Cache validator to send back on the next conditional request
    pub fn etag(&self) -> Option<&str> {
        self.inner.header(header::ETAG)
    }

    pub fn location(&self) -> Option<&str> {
        self.inner.header(header::LOCATION)
    }

    /// The peer answered "unchanged" to a conditional request
    pub fn is_not_modified(&self) -> bool {
        self.inner.status == NOT_MODIFIED
    }

    /// Decompressed body
    pub fn body(&self) -> SyncResult<Vec<u8>> {
        let encoding = ContentEncoding::from_header(self.content_encoding())?;
        codec::decompress(&self.inner.body, encoding)
    }

    /// Decompress and JSON-decode the body
    pub fn json<T: DeserializeOwned>(&self) -> SyncResult<T> {
        codec::decode_json(&self.inner.body, self.content_encoding())
    }

    pub fn into_inner(self) -> HttpResponse {
        self.inner
    }
}

/// Per-call options for [`SyncTransport::post`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostOptions {
    /// Sign the payload; requires peer support for signature checks
    pub protect: bool,
    /// Previous validator, sent as `If-None-Match`
    pub cache_token: Option<String>,
    /// Description recorded with the payload when sync auditing is on
    pub log_message: Option<String>,
}

impl PostOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn protected(mut self, protect: bool) -> Self {
        self.protect = protect;
        self
    }

    pub fn cache_token(mut self, token: impl Into<String>) -> Self {
        self.cache_token = Some(token.into());
        self
    }

    pub fn log_message(mut self, message: impl Into<String>) -> Self {
        self.log_message = Some(message.into());
        self
    }
}

/// Result of the connectivity self test
#[derive(Debug, Clone)]
pub struct PostTestOutcome {
    /// The peer echoed the test string back
    pub echoed: bool,
    pub response: SyncResponse,
}

/// Connection to one peer
pub struct SyncTransport {
    peer: PeerDescriptor,
    config: SyncConfig,
    client: Arc<dyn HttpClient>,
    gate: VersionGate,
    signer: Option<Arc<dyn Signer>>,
    audit: Arc<dyn AuditSink>,
}

impl SyncTransport {
    /// # Errors
    ///
    /// Returns `SyncError::Config` if the configuration is invalid.
    pub fn new(
        peer: PeerDescriptor,
        config: SyncConfig,
        client: Arc<dyn HttpClient>,
    ) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self {
            peer,
            config,
            client,
            gate: VersionGate::new(),
            signer: None,
            audit: Arc::new(TracingAuditSink),
        })
    }

    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    pub fn peer(&self) -> &PeerDescriptor {
        &self.peer
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Capabilities
    // ═══════════════════════════════════════════════════════════════════════

    async fn probe_info(&self) -> SyncResult<Value> {
        self.get(&self.config.info_path).await?.json()
    }

    /// Peer capabilities, probed on first use and cached afterwards
    pub async fn fetch_info(&self) -> SyncResult<Arc<PeerCapabilities>> {
        self.gate.capabilities(|| self.probe_info()).await
    }

    /// See [`VersionGate::supports`] for failure semantics
    pub async fn supports(&self, capability: Capability) -> SyncResult<bool> {
        self.gate.supports(capability, || self.probe_info()).await
    }

    async fn compression_support(&self) -> SyncResult<CompressionSupport> {
        Ok(CompressionSupport {
            brotli: self.supports(Capability::ResponseCompressionBrotli).await?,
            gzip: self.supports(Capability::ResponseCompressionGzip).await?,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Exchanges
    // ═══════════════════════════════════════════════════════════════════════

    fn request(&self, method: Method, path: &str) -> HttpRequest {
        let mut request = HttpRequest::new(method, self.peer.endpoint(path))
            .with_header(header::AUTHORIZATION, self.peer.auth_key.expose())
            .with_header(header::ACCEPT, "application/json");
        if let Some(user_agent) = &self.config.user_agent {
            request = request.with_header(header::USER_AGENT, user_agent.as_str());
        }
        request
    }

    async fn send(
        &self,
        request: HttpRequest,
        request_encoding: ContentEncoding,
    ) -> SyncResult<HttpResponse> {
        let method = request.method;
        let url = request.url.clone();
        let started_at = Utc::now();
        let start = Instant::now();

        let result = self.client.send(request).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                debug!(
                    peer_id = self.peer.id,
                    method = %method,
                    url = %url,
                    status = response.status,
                    duration_ms = elapsed_ms,
                    "Peer exchange"
                );
                self.audit_exchange(
                    started_at,
                    method,
                    &url,
                    &response,
                    request_encoding,
                    elapsed_ms,
                );
                Ok(response)
            }
            Err(TransportError::Cancelled) => {
                debug!(peer_id = self.peer.id, method = %method, url = %url, "Request cancelled");
                Err(SyncError::TransportCancelled)
            }
            Err(e) => {
                debug!(
                    peer_id = self.peer.id,
                    method = %method,
                    url = %url,
                    error = %e,
                    "Request failed"
                );
                Err(e.into())
            }
        }
    }

    /// GET `path`; any non-2xx status is an error
    pub async fn get(&self, path: &str) -> SyncResult<SyncResponse> {
        let request = self.request(Method::Get, path);
        let url = request.url.clone();
        let response = self.send(request, ContentEncoding::Identity).await?;
        if !response.is_success() {
            return Err(PeerHttpError::new(Method::Get, url, response).into());
        }
        Ok(SyncResponse::new(Method::Get, url, response))
    }

    /// Existence check: 200 is `true`, 404 is `false`
    pub async fn head(&self, path: &str) -> SyncResult<bool> {
        let request = self.request(Method::Head, path);
        let url = request.url.clone();
        let response = self.send(request, ContentEncoding::Identity).await?;
        match response.status {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(PeerHttpError::new(Method::Head, url, response).into()),
        }
    }

    /// POST a JSON payload
    ///
    /// The body is signed when `options.protect` is set, sent with
    /// `If-None-Match` when a cache token is given, and compressed when it
    /// exceeds the compression threshold and the peer accepts brotli or
    /// gzip. A 304 counts as success only when a cache token was sent.
    pub async fn post<T>(
        &self,
        path: &str,
        payload: &T,
        options: PostOptions,
    ) -> SyncResult<SyncResponse>
    where
        T: Serialize + ?Sized,
    {
        let body = codec::encode_json(payload)?;

        if self.config.sync_audit {
            if let Some(message) = options.log_message.as_deref() {
                self.audit_payload(message, &body);
            }
        }

        let mut request = self
            .request(Method::Post, path)
            .with_header(header::CONTENT_TYPE, "application/json");

        if options.protect {
            let signing_supported = self.supports(Capability::ProtectedEventSigning).await?;
            let signature =
                codec::sign_payload(&body, signing_supported, self.signer.as_deref())?;
            request = request.with_header(header::SIGNATURE, signature);
        }

        if let Some(token) = options.cache_token.as_deref() {
            request = request.with_header(header::IF_NONE_MATCH, codec::conditional_token(token));
        }

        let encoding = if body.len() > self.config.compression_threshold() {
            codec::select_compression(body.len(), self.compression_support().await?)
        } else {
            ContentEncoding::Identity
        };
        let body = match encoding {
            ContentEncoding::Identity => body,
            other => codec::compress(&body, other)?,
        };
        if let Some(value) = encoding.header_value() {
            request = request.with_header(header::CONTENT_ENCODING, value);
        }

        let request = request.with_body(body);
        let url = request.url.clone();
        let response = self.send(request, encoding).await?;

        if options.cache_token.is_some() && response.status == NOT_MODIFIED {
            debug!(peer_id = self.peer.id, url = %url, "Peer reports content not modified");
            return Ok(SyncResponse::new(Method::Post, url, response));
        }
        if !response.is_success() {
            return Err(PeerHttpError::new(Method::Post, url, response).into());
        }
        Ok(SyncResponse::new(Method::Post, url, response))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Peer account and search helpers
    // ═══════════════════════════════════════════════════════════════════════

    /// Our user record on the peer
    pub async fn user_info(&self) -> SyncResult<Value> {
        self.get("/users/view/me.json").await?.json()
    }

    /// Ask the peer to rotate the key we authenticate with
    pub async fn reset_auth_key(&self) -> SyncResult<SyncResponse> {
        self.post("/users/resetauthkey/me", &json!([]), PostOptions::new())
            .await
    }

    /// Tags, orgs and other values usable in sync filtering rules
    pub async fn available_sync_filtering_rules(&self) -> SyncResult<Value> {
        self.get("/servers/getAvailableSyncFilteringRules")
            .await?
            .json()
    }

    /// POST connectivity self test
    ///
    /// # Errors
    ///
    /// Returns `CapabilityUnavailable(connectivity-self-test)` on peers
    /// without the endpoint.
    pub async fn post_test(&self, test_string: &str) -> SyncResult<PostTestOutcome> {
        if !self.supports(Capability::ConnectivitySelfTest).await? {
            return Err(SyncError::CapabilityUnavailable(
                Capability::ConnectivitySelfTest,
            ));
        }
        let response = self
            .post(
                "/servers/postTest",
                &json!({ "testString": test_string }),
                PostOptions::new(),
            )
            .await?;

        let echoed = match response.json::<Value>() {
            Ok(body) => {
                body.pointer("/body/testString").and_then(Value::as_str) == Some(test_string)
            }
            Err(_) => false,
        };
        Ok(PostTestOutcome { echoed, response })
    }

    pub async fn attribute_search(&self, rules: &Value) -> SyncResult<SyncResponse> {
        self.post("/attributes/restSearch.json", rules, PostOptions::new())
            .await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Audit
    // ═══════════════════════════════════════════════════════════════════════

    fn audit_exchange(
        &self,
        started_at: DateTime<Utc>,
        method: Method,
        url: &str,
        response: &HttpResponse,
        request_encoding: ContentEncoding,
        duration_ms: u64,
    ) {
        let record = ExchangeRecord {
            ts: started_at,
            peer_id: self.peer.id,
            method: method.to_string(),
            url: url.to_string(),
            status: response.status,
            response_size: response.body.len(),
            duration_ms,
            request_encoding: request_encoding.header_value().map(str::to_string),
            response_encoding: response
                .header(header::CONTENT_ENCODING)
                .map(str::to_string),
        };
        if let Err(e) = self.audit.record_exchange(&record) {
            warn!(peer_id = self.peer.id, error = %e, "Audit sink rejected exchange record");
        }
    }

    fn audit_payload(&self, message: &str, body: &[u8]) {
        let record = PayloadRecord {
            ts: Utc::now(),
            peer_id: self.peer.id,
            message: message.to_string(),
            payload: String::from_utf8_lossy(body).into_owned(),
        };
        if let Err(e) = self.audit.record_payload(&record) {
            warn!(peer_id = self.peer.id, error = %e, "Audit sink rejected payload record");
        }
    }
}

impl std::fmt::Debug for SyncTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncTransport")
            .field("peer", &self.peer)
            .field("config", &self.config)
            .field("signer", &self.signer.is_some())
            .finish()
    }
}
