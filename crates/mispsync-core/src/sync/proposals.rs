//! Proposal (shadow attribute) pull

use serde_json::Value;
use tracing::debug;

use super::params::NamedParams;
use super::transport::SyncTransport;
use crate::error::{SyncError, SyncResult};
use crate::types::Capability;

/// Result of a proposal fetch
#[derive(Debug, Clone, PartialEq)]
pub enum ProposalOutcome {
    /// The peer predates proposal sync; nothing to pull
    Unsupported,
    Fetched(Vec<Value>),
}

pub struct ProposalSync<'a> {
    transport: &'a SyncTransport,
}

impl<'a> ProposalSync<'a> {
    pub fn new(transport: &'a SyncTransport) -> Self {
        Self { transport }
    }

    /// `GET /shadow_attributes/index<params>.json`
    pub async fn fetch(&self, params: &NamedParams) -> SyncResult<ProposalOutcome> {
        if !self.transport.supports(Capability::ProposalSync).await? {
            debug!(
                peer_id = self.transport.peer().id,
                "Peer does not serve proposals"
            );
            return Ok(ProposalOutcome::Unsupported);
        }

        let path = format!("/shadow_attributes/index{}.json", params);
        let value: Value = self.transport.get(&path).await?.json()?;
        match value {
            Value::Array(items) => Ok(ProposalOutcome::Fetched(items)),
            other => Err(SyncError::Decode(format!(
                "proposal index must be a JSON array, got {}",
                type_name(&other)
            ))),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
