//! Peer capability negotiation
//!
//! The peer's info endpoint reports its version plus a few feature flags.
//! [`PeerCapabilities`] evaluates every [`Capability`] against that payload
//! once; [`VersionGate`] caches the outcome for the life of one connection.
//!
//! Concurrent first callers share a single in-flight probe. A failed probe
//! is cached like a successful one, except cancellation, which leaves the
//! gate empty so the next caller probes again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::types::{Capability, CapabilityRule};

/// Parse `MAJOR.MINOR.PATCH`; anything else yields `None`
///
/// Pre-release and build suffixes (`2.4.169-rc1`, `2.4.169+build7`) are
/// rejected, so such peers fail closed on every version gate.
pub fn parse_version(raw: &str) -> Option<(u64, u64, u64)> {
    semver::Version::parse(raw.trim())
        .ok()
        .filter(|v| v.pre.is_empty() && v.build.is_empty())
        .map(|v| (v.major, v.minor, v.patch))
}

fn flag_is_set(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

/// What one peer supports, computed from its info payload
#[derive(Debug, Clone, PartialEq)]
pub struct PeerCapabilities {
    version: String,
    parsed: Option<(u64, u64, u64)>,
    capabilities: HashMap<Capability, bool>,
    info: Value,
}

impl PeerCapabilities {
    /// Evaluate all capabilities against an info payload
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ProtocolViolation` unless the payload is an
    /// object with a string `version` field.
    pub fn from_info(info: Value) -> SyncResult<Self> {
        let version = match info.get("version") {
            Some(Value::String(v)) => v.clone(),
            Some(_) => {
                return Err(SyncError::ProtocolViolation(
                    "`version` field of peer info is not a string".to_string(),
                ))
            }
            None => {
                return Err(SyncError::ProtocolViolation(
                    "`version` field missing from peer info".to_string(),
                ))
            }
        };
        let parsed = parse_version(&version);

        let capabilities = Capability::ALL
            .into_iter()
            .map(|cap| (cap, Self::evaluate(cap.rule(), &info, parsed)))
            .collect();

        Ok(Self {
            version,
            parsed,
            capabilities,
            info,
        })
    }

    fn evaluate(rule: CapabilityRule, info: &Value, parsed: Option<(u64, u64, u64)>) -> bool {
        match rule {
            CapabilityRule::RequestEncoding(encoding) => info
                .get("request_encoding")
                .and_then(Value::as_array)
                .is_some_and(|list| list.iter().any(|e| e.as_str() == Some(encoding))),
            CapabilityRule::Flag(field) => flag_is_set(info.get(field)),
            CapabilityRule::FieldPresent(field) => {
                info.get(field).is_some_and(|value| !value.is_null())
            }
            CapabilityRule::MinVersion(threshold) => parsed
                .is_some_and(|(major, minor, patch)| threshold.is_met_by(major, minor, patch)),
        }
    }

    /// Version string exactly as reported
    pub fn version(&self) -> &str {
        &self.version
    }

    /// `(major, minor, patch)`, `None` when the version is malformed
    pub fn parsed_version(&self) -> Option<(u64, u64, u64)> {
        self.parsed
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.get(&capability).copied().unwrap_or(false)
    }

    /// All capabilities with their answer, in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (Capability, bool)> + '_ {
        Capability::ALL
            .into_iter()
            .map(|cap| (cap, self.supports(cap)))
    }

    /// Raw info payload
    pub fn info(&self) -> &Value {
        &self.info
    }
}

/// Per-connection capability cache
#[derive(Debug, Default)]
pub struct VersionGate {
    cell: OnceCell<Result<Arc<PeerCapabilities>, SyncError>>,
}

impl VersionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached outcome, without probing
    pub fn cached(&self) -> Option<&Result<Arc<PeerCapabilities>, SyncError>> {
        self.cell.get()
    }

    /// Return the cached capabilities, running `probe` on first use
    ///
    /// `probe` fetches the raw info payload. Only one probe runs at a time;
    /// concurrent callers wait for it and share its outcome.
    pub async fn capabilities<F, Fut>(&self, probe: F) -> SyncResult<Arc<PeerCapabilities>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<Value>>,
    {
        let outcome = self
            .cell
            .get_or_try_init(|| async move {
                match probe().await.and_then(PeerCapabilities::from_info) {
                    Err(SyncError::TransportCancelled) => Err(SyncError::TransportCancelled),
                    Ok(caps) => {
                        info!(
                            version = %caps.version(),
                            parsed = caps.parsed_version().is_some(),
                            "Peer capabilities probed"
                        );
                        Ok(Ok(Arc::new(caps)))
                    }
                    Err(e) => {
                        info!(error = %e, "Peer capability probe failed");
                        Ok(Err(e))
                    }
                }
            })
            .await?;
        outcome.clone()
    }

    /// Answer one capability question
    ///
    /// When the probe failed, optional capabilities report `false`. A
    /// capability required for correctness re-raises the probe error, and
    /// cancellation always propagates.
    pub async fn supports<F, Fut>(&self, capability: Capability, probe: F) -> SyncResult<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<Value>>,
    {
        match self.capabilities(probe).await {
            Ok(caps) => Ok(caps.supports(capability)),
            Err(SyncError::TransportCancelled) => Err(SyncError::TransportCancelled),
            Err(e) if capability.is_required_for_correctness() => Err(e),
            Err(e) => {
                debug!(capability = %capability, error = %e, "Treating capability as unsupported");
                Ok(false)
            }
        }
    }
}
