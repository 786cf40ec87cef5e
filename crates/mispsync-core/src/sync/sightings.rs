//! Sighting exchange
//!
//! Push is dedup-then-upload: the peer is asked which sighting UUIDs of an
//! event it already holds (when it supports the filter), the rest go up in
//! one batch. Pull walks the peer's event index, downloads each event and
//! hands its attached sightings to a [`SightingStore`].

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::params::NamedParams;
use super::records::{EventSync, IndexOutcome, RecordSync, SkippedRecord};
use super::transport::{PostOptions, SyncTransport};
use crate::error::{SyncError, SyncResult};
use crate::types::{sightings_from_event, Capability, RecordKind, Sighting};

/// Local persistence for pulled sightings
pub trait SightingStore: Send + Sync {
    /// Save sightings of one event, returning how many were stored
    fn bulk_save(&self, event_uuid: &str, sightings: &[Sighting]) -> SyncResult<usize>;
}

/// Outcome of [`SightingSync::push_for_event`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SightingPushReport {
    pub uploaded: usize,
    /// Already present on the peer
    pub excluded: usize,
}

/// Outcome of [`SightingSync::pull`]
#[derive(Debug, Clone, Default)]
pub struct SightingPullReport {
    /// Sightings the store reported as saved
    pub saved: usize,
    /// Events downloaded and handed to the store
    pub events_processed: usize,
    pub skipped: Vec<SkippedRecord>,
}

pub struct SightingSync<'a> {
    transport: &'a SyncTransport,
}

impl<'a> SightingSync<'a> {
    pub fn new(transport: &'a SyncTransport) -> Self {
        Self { transport }
    }

    /// UUIDs among `candidates` the peer already has
    ///
    /// Peers without dedup support (or whose capability probe failed) get
    /// an empty set, meaning "push everything".
    pub async fn filter_for_push(
        &self,
        event_uuid: &str,
        candidates: &[String],
    ) -> SyncResult<HashSet<String>> {
        if !self.transport.supports(Capability::SightingFilterDedup).await? {
            debug!(
                peer_id = self.transport.peer().id,
                event_uuid, "Peer cannot filter sightings, pushing all"
            );
            return Ok(HashSet::new());
        }

        let path = format!("/sightings/filterSightingUuidsForPush/{}", event_uuid);
        let existing: Vec<String> = self
            .transport
            .post(&path, candidates, PostOptions::new())
            .await?
            .json()?;
        Ok(existing.into_iter().collect())
    }

    /// Upload all `sightings` of one event in a single request
    ///
    /// Sightings without an org get the default attribution. Any failure
    /// fails the whole batch.
    pub async fn bulk_upload(
        &self,
        event_uuid: &str,
        mut sightings: Vec<Sighting>,
    ) -> SyncResult<usize> {
        for sighting in &mut sightings {
            sighting.ensure_org_attribution();
        }

        let path = format!("/sightings/bulkSaveSightings/{}", event_uuid);
        let message = format!(
            "Pushing Sightings for Event #{} to Server #{}",
            event_uuid,
            self.transport.peer().id
        );
        self.transport
            .post(&path, &sightings, PostOptions::new().log_message(message))
            .await?;

        info!(
            peer_id = self.transport.peer().id,
            event_uuid,
            count = sightings.len(),
            "Sightings uploaded"
        );
        Ok(sightings.len())
    }

    /// Dedup against the peer, then upload what is left
    pub async fn push_for_event(
        &self,
        event_uuid: &str,
        sightings: Vec<Sighting>,
    ) -> SyncResult<SightingPushReport> {
        let candidates: Vec<String> = sightings
            .iter()
            .filter_map(|s| s.uuid().map(str::to_string))
            .collect();
        let existing = if candidates.is_empty() {
            HashSet::new()
        } else {
            self.filter_for_push(event_uuid, &candidates).await?
        };

        let (excluded, remaining): (Vec<_>, Vec<_>) = sightings
            .into_iter()
            .partition(|s| s.uuid().is_some_and(|uuid| existing.contains(uuid)));

        if remaining.is_empty() {
            return Ok(SightingPushReport {
                uploaded: 0,
                excluded: excluded.len(),
            });
        }

        let uploaded = self.bulk_upload(event_uuid, remaining).await?;
        Ok(SightingPushReport {
            uploaded,
            excluded: excluded.len(),
        })
    }

    /// Pull sightings of every event matching `filter` into `store`
    ///
    /// # Errors
    ///
    /// Fails only if the event index cannot be fetched or the run is
    /// cancelled. Per-event failures are reported as skipped.
    pub async fn pull(
        &self,
        filter: &Value,
        store: &dyn SightingStore,
    ) -> SyncResult<SightingPullReport> {
        let peer_id = self.transport.peer().id;
        let mut report = SightingPullReport::default();
        let ids: Vec<String> = match EventSync::new(self.transport).index(filter, None).await? {
            IndexOutcome::Fresh {
                entries, malformed, ..
            } => {
                report.skipped.extend(malformed);
                entries.into_iter().map(|e| e.id).collect()
            }
            IndexOutcome::NotModified => Vec::new(),
        };
        debug!(peer_id, events = ids.len(), "Pulling sightings");

        let events = RecordSync::new(self.transport, RecordKind::Event);
        let params = NamedParams::new();

        for id in ids {
            let event = match events.fetch(&id, &params).await {
                Ok(event) => event,
                Err(SyncError::TransportCancelled) => return Err(SyncError::TransportCancelled),
                Err(e) => {
                    warn!(peer_id, id = %id, error = %e, "Failed downloading event, skipping");
                    report.skipped.push(SkippedRecord { id, reason: e });
                    continue;
                }
            };

            let sightings = sightings_from_event(&event.to_value());
            let Some(event_uuid) = event.uuid() else {
                warn!(peer_id, id = %id, "Event without UUID, skipping its sightings");
                report.skipped.push(SkippedRecord {
                    id,
                    reason: SyncError::Decode("event has no UUID".to_string()),
                });
                continue;
            };
            if sightings.is_empty() {
                report.events_processed += 1;
                continue;
            }

            match store.bulk_save(event_uuid, &sightings) {
                Ok(saved) => {
                    report.saved += saved;
                    report.events_processed += 1;
                }
                Err(e) => {
                    warn!(peer_id, event_uuid, error = %e, "Saving sightings failed, skipping");
                    report.skipped.push(SkippedRecord { id, reason: e });
                }
            }
        }

        info!(
            peer_id,
            saved = report.saved,
            events = report.events_processed,
            skipped = report.skipped.len(),
            "Sighting pull finished"
        );
        Ok(report)
    }

    /// All sightings of the given events via REST search
    ///
    /// # Errors
    ///
    /// Returns `CapabilityUnavailable(sighting-rest-search)` on older peers.
    pub async fn search_for_events(&self, event_uuids: &[String]) -> SyncResult<Vec<Sighting>> {
        if !self.transport.supports(Capability::SightingRestSearch).await? {
            return Err(SyncError::CapabilityUnavailable(Capability::SightingRestSearch));
        }

        let body = serde_json::json!({
            "returnFormat": "json",
            "last": 0,
            "includeUuid": true,
            "uuid": event_uuids,
        });
        let mut result: Value = self
            .transport
            .post("/sightings/restSearch/event", &body, PostOptions::new())
            .await?
            .json()?;

        let Some(Value::Array(items)) = result.get_mut("response").map(Value::take) else {
            return Err(SyncError::Decode(
                "sighting search result has no `response` list".to_string(),
            ));
        };

        items
            .into_iter()
            .map(|item| match item {
                Value::Object(mut map) if map.contains_key("Sighting") => {
                    Sighting::from_value(map.remove("Sighting").unwrap_or(Value::Null))
                }
                other => Sighting::from_value(other),
            })
            .collect()
    }
}
