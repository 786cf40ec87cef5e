//! Record push and pull
//!
//! ## Push
//!
//! ```text
//! HEAD /events/view/<uuid> ──200──► update  POST /events/edit/<uuid>/metadata:1
//!        │                                    └─404──► create (once)
//!        └──404 / failure──► create  POST /events/add/metadata:1
//!                                     └─404 + Location …/<id>──► update <id> (once)
//! ```
//!
//! The existence check fails open: if it errors for any reason other than
//! cancellation, the record is treated as missing and created. Each push
//! makes at most one retry.
//!
//! ## Pull
//!
//! Records are fetched one id at a time. A failed fetch is logged and
//! reported as skipped; the loop continues with the next id. Only
//! cancellation aborts the loop.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::params::NamedParams;
use super::transport::{PostOptions, SyncResponse, SyncTransport};
use crate::error::{SyncError, SyncResult};
use crate::http::header;
use crate::types::record::{deserialize_id, deserialize_timestamp};
use crate::types::{Record, RecordKind};

/// An id the pull loop could not fetch
#[derive(Debug, Clone)]
pub struct SkippedRecord {
    pub id: String,
    pub reason: SyncError,
}

/// Outcome of a best-effort pull
#[derive(Debug, Clone, Default)]
pub struct PullReport {
    pub records: Vec<Record>,
    pub skipped: Vec<SkippedRecord>,
}

impl PullReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn skipped_ids(&self) -> impl Iterator<Item = &str> {
        self.skipped.iter().map(|s| s.id.as_str())
    }
}

/// Fetch and existence check for one record kind
pub struct RecordSync<'a> {
    transport: &'a SyncTransport,
    kind: RecordKind,
}

impl<'a> RecordSync<'a> {
    pub fn new(transport: &'a SyncTransport, kind: RecordKind) -> Self {
        Self { transport, kind }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// `GET /<records>/view/<id><params>`
    pub async fn fetch(&self, id: &str, params: &NamedParams) -> SyncResult<Record> {
        let path = format!("{}{}", self.kind.view_path(id), params);
        let value: Value = self.transport.get(&path).await?.json()?;
        Record::from_value(self.kind, value)
    }

    /// `HEAD /<records>/view/<uuid>`
    pub async fn exists(&self, uuid: &str) -> SyncResult<bool> {
        self.transport.head(&self.kind.view_path(uuid)).await
    }

    /// Fetch every id in order, skipping the ones that fail
    ///
    /// # Errors
    ///
    /// Only `SyncError::TransportCancelled`; every other failure is
    /// recorded in [`PullReport::skipped`].
    pub async fn pull<I, S>(&self, ids: I, params: &NamedParams) -> SyncResult<PullReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = PullReport::default();

        for id in ids {
            let id = id.as_ref();
            match self.fetch(id, params).await {
                Ok(record) => report.records.push(record),
                Err(SyncError::TransportCancelled) => return Err(SyncError::TransportCancelled),
                Err(e) => {
                    warn!(
                        peer_id = self.transport.peer().id,
                        kind = %self.kind,
                        id,
                        error = %e,
                        "Failed to fetch record, skipping"
                    );
                    report.skipped.push(SkippedRecord {
                        id: id.to_string(),
                        reason: e,
                    });
                }
            }
        }

        info!(
            peer_id = self.transport.peer().id,
            kind = %self.kind,
            pulled = report.records.len(),
            skipped = report.skipped.len(),
            "Pull finished"
        );
        Ok(report)
    }
}

/// Where a push is sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushTarget {
    /// `POST /events/add/metadata:1`
    Create,
    /// `POST /events/edit/<id>/metadata:1`
    Update(String),
}

impl PushTarget {
    pub fn path(&self) -> String {
        match self {
            PushTarget::Create => "/events/add/metadata:1".to_string(),
            PushTarget::Update(id) => format!("/events/edit/{}/metadata:1", id),
        }
    }
}

/// What to do after one push attempt
#[derive(Debug)]
pub enum PushStep {
    Accepted(SyncResponse),
    RetryAs(PushTarget),
    Failed(SyncError),
}

impl PushStep {
    /// Classify the result of an attempt against `attempted`
    ///
    /// Only a 404 is recoverable: an update retries as create, a create
    /// whose response carries `Location` retries as an update of the id in
    /// its last path segment.
    pub fn after(attempted: &PushTarget, result: SyncResult<SyncResponse>) -> Self {
        let err = match result {
            Ok(response) => return PushStep::Accepted(response),
            Err(err) => err,
        };
        if err.status() != Some(404) {
            return PushStep::Failed(err);
        }
        match attempted {
            PushTarget::Update(_) => PushStep::RetryAs(PushTarget::Create),
            PushTarget::Create => {
                let relocated = err
                    .response()
                    .and_then(|r| r.header(header::LOCATION))
                    .and_then(last_path_segment);
                match relocated {
                    Some(id) => PushStep::RetryAs(PushTarget::Update(id)),
                    None => PushStep::Failed(err),
                }
            }
        }
    }
}

/// Trailing segment of a URL or path, ignoring query and trailing slash
pub fn last_path_segment(location: &str) -> Option<String> {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// One row of the peer's event index
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventIndexEntry {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub uuid: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: i64,
}

/// Result of a conditional index request
#[derive(Debug, Clone)]
pub enum IndexOutcome {
    /// The caller's cached index is still current
    NotModified,
    Fresh {
        entries: Vec<EventIndexEntry>,
        /// Validator to store for the next request
        etag: Option<String>,
        /// Rows that did not decode as index entries
        malformed: Vec<SkippedRecord>,
    },
}

impl IndexOutcome {
    pub fn entries(&self) -> &[EventIndexEntry] {
        match self {
            IndexOutcome::NotModified => &[],
            IndexOutcome::Fresh { entries, .. } => entries,
        }
    }
}

fn parse_index(value: Value) -> SyncResult<(Vec<EventIndexEntry>, Vec<SkippedRecord>)> {
    let Value::Array(items) = value else {
        return Err(SyncError::Decode("event index must be a JSON array".to_string()));
    };

    let mut entries = Vec::with_capacity(items.len());
    let mut malformed = Vec::new();
    for (position, item) in items.into_iter().enumerate() {
        let item = match item {
            Value::Object(mut map) if map.contains_key("Event") => {
                map.remove("Event").unwrap_or(Value::Null)
            }
            other => other,
        };
        // Rows without a usable id are named by their position
        let id = match item.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => format!("#{}", position),
        };
        match serde_json::from_value::<EventIndexEntry>(item) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(id = %id, error = %e, "Skipping malformed event index entry");
                malformed.push(SkippedRecord {
                    id,
                    reason: SyncError::Decode(format!("malformed event index entry: {}", e)),
                });
            }
        }
    }
    Ok((entries, malformed))
}

/// Ids worth pulling: unknown locally, or newer on the peer
///
/// `local` maps event UUID to the local copy's timestamp.
pub fn ids_newer_than(entries: &[EventIndexEntry], local: &HashMap<String, i64>) -> Vec<String> {
    entries
        .iter()
        .filter(|entry| match local.get(&entry.uuid) {
            Some(&timestamp) => entry.timestamp > timestamp,
            None => true,
        })
        .map(|entry| entry.id.clone())
        .collect()
}

/// Event push, index and push pre-filtering
pub struct EventSync<'a> {
    transport: &'a SyncTransport,
}

impl<'a> EventSync<'a> {
    pub fn new(transport: &'a SyncTransport) -> Self {
        Self { transport }
    }

    pub fn records(&self) -> RecordSync<'a> {
        RecordSync::new(self.transport, RecordKind::Event)
    }

    pub async fn exists(&self, uuid: &str) -> SyncResult<bool> {
        self.records().exists(uuid).await
    }

    async fn send(&self, record: &Record, target: &PushTarget) -> SyncResult<SyncResponse> {
        let message = format!(
            "Pushing Event #{} to Server #{}",
            record.id().unwrap_or_else(|| "?".to_string()),
            self.transport.peer().id
        );
        let options = PostOptions::new()
            .protected(record.is_protected())
            .log_message(message);
        self.transport.post(&target.path(), record, options).await
    }

    pub async fn create(&self, record: &Record) -> SyncResult<SyncResponse> {
        self.send(record, &PushTarget::Create).await
    }

    /// Update the peer's copy addressed by `id`, or by the record's UUID
    pub async fn update(&self, record: &Record, id: Option<&str>) -> SyncResult<SyncResponse> {
        let id = id.or_else(|| record.uuid()).ok_or_else(|| {
            SyncError::Encode("Update requires an id or a record UUID".to_string())
        })?;
        self.send(record, &PushTarget::Update(id.to_string())).await
    }

    /// Create or update `record` on the peer
    pub async fn push(&self, record: &Record) -> SyncResult<SyncResponse> {
        let peer_id = self.transport.peer().id;

        let first = match record.uuid() {
            None => PushTarget::Create,
            Some(uuid) => match self.exists(uuid).await {
                Ok(true) => PushTarget::Update(uuid.to_string()),
                Ok(false) => PushTarget::Create,
                Err(SyncError::TransportCancelled) => return Err(SyncError::TransportCancelled),
                Err(e) => {
                    warn!(
                        peer_id,
                        uuid,
                        error = %e,
                        "Existence check failed, assuming not present"
                    );
                    PushTarget::Create
                }
            },
        };

        let result = self.send(record, &first).await;
        match PushStep::after(&first, result) {
            PushStep::Accepted(response) => {
                info!(peer_id, record = %record.label(), via = ?first, "Event pushed");
                Ok(response)
            }
            PushStep::Failed(e) => Err(e),
            PushStep::RetryAs(second) => {
                info!(
                    peer_id,
                    record = %record.label(),
                    from = ?first,
                    to = ?second,
                    "Push got 404, retrying once"
                );
                self.send(record, &second).await
            }
        }
    }

    /// `POST /events/index` with the caller's filter
    ///
    /// With a `cache_token` the peer may answer "not modified".
    pub async fn index(
        &self,
        filter: &Value,
        cache_token: Option<&str>,
    ) -> SyncResult<IndexOutcome> {
        let mut options = PostOptions::new();
        if let Some(token) = cache_token {
            options = options.cache_token(token);
        }

        let response = self
            .transport
            .post(&RecordKind::Event.index_path(), filter, options)
            .await?;
        if cache_token.is_some() && response.is_not_modified() {
            return Ok(IndexOutcome::NotModified);
        }

        let (entries, malformed) = parse_index(response.json()?)?;
        Ok(IndexOutcome::Fresh {
            entries,
            etag: response.etag().map(str::to_string),
            malformed,
        })
    }

    /// Ask the peer which of `events` it actually wants
    ///
    /// `events` is a list of `{"Event": {"uuid", "timestamp"}}` stubs; the
    /// answer is the UUIDs worth pushing.
    pub async fn filter_ids_for_push(&self, events: &[Value]) -> SyncResult<Vec<String>> {
        self.transport
            .post("/events/filterEventIdsForPush", events, PostOptions::new())
            .await?
            .json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PeerHttpError;
    use crate::http::{HttpResponse, Method};
    use serde_json::json;

    fn not_found(location: Option<&str>) -> SyncResult<SyncResponse> {
        let headers = location
            .map(|l| vec![("Location".to_string(), l.to_string())])
            .unwrap_or_default();
        let response = HttpResponse::new(404, headers, "");
        Err(PeerHttpError::new(Method::Post, "https://peer/events/add/metadata:1", response).into())
    }

    #[test]
    fn test_last_path_segment() {
        assert_eq!(last_path_segment("/events/view/42").as_deref(), Some("42"));
        assert_eq!(last_path_segment("https://peer/events/view/42/").as_deref(), Some("42"));
        assert_eq!(last_path_segment("/events/view/42?x=1").as_deref(), Some("42"));
        assert_eq!(last_path_segment("/").as_deref(), None);
        assert_eq!(last_path_segment("").as_deref(), None);
    }

    #[test]
    fn test_step_update_404_retries_create() {
        let step = PushStep::after(&PushTarget::Update("u1".into()), not_found(None));
        assert!(matches!(step, PushStep::RetryAs(PushTarget::Create)));
    }

    #[test]
    fn test_step_create_404_with_location() {
        let step = PushStep::after(&PushTarget::Create, not_found(Some("/events/view/42")));
        assert!(matches!(step, PushStep::RetryAs(PushTarget::Update(ref id)) if id == "42"));

        let step = PushStep::after(&PushTarget::Create, not_found(None));
        assert!(matches!(step, PushStep::Failed(_)));
    }

    #[test]
    fn test_step_other_errors_fail() {
        let response = HttpResponse::status_only(403);
        let err: SyncError = PeerHttpError::new(Method::Post, "u", response).into();
        let step = PushStep::after(&PushTarget::Update("u1".into()), Err(err));
        assert!(matches!(step, PushStep::Failed(ref e) if e.status() == Some(403)));

        let step = PushStep::after(&PushTarget::Create, Err(SyncError::TransportCancelled));
        assert!(matches!(step, PushStep::Failed(SyncError::TransportCancelled)));
    }

    #[test]
    fn test_target_paths() {
        assert_eq!(PushTarget::Create.path(), "/events/add/metadata:1");
        assert_eq!(
            PushTarget::Update("42".into()).path(),
            "/events/edit/42/metadata:1"
        );
    }

    #[test]
    fn test_parse_index_accepts_flat_and_wrapped() {
        let (entries, _malformed) = parse_index(json!([
            {"id": "1", "uuid": "a", "timestamp": "100"},
            {"Event": {"id": 2, "uuid": "b", "timestamp": 200}},
            {"uuid": "missing-id"}
        ]))
        .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].id, "2");
        assert_eq!(entries[1].timestamp, 200);

        assert!(parse_index(json!({"Event": []})).is_err());
    }

    #[test]
    fn test_ids_newer_than() {
        let (entries, _malformed) = parse_index(json!([
            {"id": "1", "uuid": "a", "timestamp": 100},
            {"id": "2", "uuid": "b", "timestamp": 200},
            {"id": "3", "uuid": "c", "timestamp": 300}
        ]))
        .unwrap();
        let local = HashMap::from([("a".to_string(), 100), ("b".to_string(), 150)]);
        assert_eq!(ids_newer_than(&entries, &local), vec!["2", "3"]);
    }
}
