//! Galaxy cluster exchange

use serde_json::Value;
use tracing::info;

use super::params::NamedParams;
use super::records::RecordSync;
use super::transport::{PostOptions, SyncResponse, SyncTransport};
use crate::error::{SyncError, SyncResult};
use crate::types::{Capability, Record, RecordKind};

pub struct GalaxyClusterSync<'a> {
    transport: &'a SyncTransport,
}

impl<'a> GalaxyClusterSync<'a> {
    pub fn new(transport: &'a SyncTransport) -> Self {
        Self { transport }
    }

    /// `POST /galaxy_clusters/restSearch`
    ///
    /// Accepts both a bare list and a `{"response": [...]}` envelope.
    pub async fn search(&self, rules: &Value) -> SyncResult<Vec<Record>> {
        let mut result: Value = self
            .transport
            .post("/galaxy_clusters/restSearch", rules, PostOptions::new())
            .await?
            .json()?;

        let envelope = result.get_mut("response").map(Value::take);
        let items = match envelope {
            Some(Value::Array(items)) => items,
            _ => match result {
                Value::Array(items) => items,
                _ => {
                    return Err(SyncError::Decode(
                        "galaxy cluster search did not return a list".to_string(),
                    ))
                }
            },
        };

        items.into_iter().map(Record::galaxy_cluster).collect()
    }

    /// `GET /galaxy_clusters/view/<id>`
    pub async fn fetch(&self, id: &str) -> SyncResult<Record> {
        RecordSync::new(self.transport, RecordKind::GalaxyCluster)
            .fetch(id, &NamedParams::new())
            .await
    }

    /// `POST /galaxies/pushCluster` with a one-element list
    ///
    /// # Errors
    ///
    /// Returns `CapabilityUnavailable(galaxy-cluster-edit)` when the peer
    /// predates cluster editing.
    pub async fn push(&self, cluster: &Record) -> SyncResult<SyncResponse> {
        if !self.transport.supports(Capability::GalaxyClusterEdit).await? {
            return Err(SyncError::CapabilityUnavailable(Capability::GalaxyClusterEdit));
        }

        let message = format!(
            "Pushing Galaxy Cluster #{} to Server #{}",
            cluster.id().unwrap_or_else(|| "?".to_string()),
            self.transport.peer().id
        );
        let response = self
            .transport
            .post(
                "/galaxies/pushCluster",
                std::slice::from_ref(cluster),
                PostOptions::new().log_message(message),
            )
            .await?;

        info!(
            peer_id = self.transport.peer().id,
            cluster = %cluster.label(),
            "Galaxy cluster pushed"
        );
        Ok(response)
    }
}
