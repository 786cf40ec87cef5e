//! Capability names a peer may or may not support
//!
//! Older peers lack features that newer ones advertise. Each capability is
//! answered either from a field of the peer's info payload or from its
//! reported version.
//!
//! ## Capabilities
//!
//! - **Flag-gated**: request compression, sighting dedup, sync and galaxy
//!   editor permissions
//! - **Version-gated**: protected event signing, proposal sync, org-scoped
//!   rules, sighting REST search, connectivity self test
//!
//! ## Example
//!
//! ```rust
//! use mispsync_core::types::capability::Capability;
//!
//! let cap: Capability = "sighting-filter-dedup".parse().unwrap();
//! assert_eq!(cap, Capability::SightingFilterDedup);
//! assert!("sighting-teleport".parse::<Capability>().is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum version under the exact-major / exact-minor / minimum-patch rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionThreshold {
    pub major: u64,
    pub minor: u64,
    pub min_patch: u64,
}

impl VersionThreshold {
    pub const fn new(major: u64, minor: u64, min_patch: u64) -> Self {
        Self {
            major,
            minor,
            min_patch,
        }
    }

    /// True iff `major` and `minor` match exactly and `patch >= min_patch`
    pub fn is_met_by(&self, major: u64, minor: u64, patch: u64) -> bool {
        major == self.major && minor == self.minor && patch >= self.min_patch
    }
}

/// How a capability is answered from the peer's info payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityRule {
    /// `request_encoding` array lists this encoding
    RequestEncoding(&'static str),
    /// Boolean field is present and true
    Flag(&'static str),
    /// Field is present, whatever its value
    FieldPresent(&'static str),
    /// Reported version meets the threshold
    MinVersion(VersionThreshold),
}

/// A named, version- or flag-gated feature of a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Peer accepts brotli-compressed request bodies
    ResponseCompressionBrotli,
    /// Peer accepts gzip-compressed request bodies
    ResponseCompressionGzip,
    /// Peer can report which sighting UUIDs it already has
    SightingFilterDedup,
    /// Peer verifies signatures on protected events
    ProtectedEventSigning,
    /// Our account on the peer holds the sync permission
    SyncPermission,
    /// Our account on the peer holds the galaxy editor permission
    GalaxyEditorPermission,
    /// Peer serves proposals (shadow attributes) for pull
    ProposalSync,
    /// Peer understands organisation-scoped sync rules
    OrgScopedRules,
    /// Peer exposes sighting REST search by event
    SightingRestSearch,
    /// Peer implements the POST connectivity self test
    ConnectivitySelfTest,
    /// Peer knows about galaxy cluster editing at all
    GalaxyClusterEdit,
}

impl Capability {
    /// Every capability, in declaration order
    pub const ALL: [Capability; 11] = [
        Capability::ResponseCompressionBrotli,
        Capability::ResponseCompressionGzip,
        Capability::SightingFilterDedup,
        Capability::ProtectedEventSigning,
        Capability::SyncPermission,
        Capability::GalaxyEditorPermission,
        Capability::ProposalSync,
        Capability::OrgScopedRules,
        Capability::SightingRestSearch,
        Capability::ConnectivitySelfTest,
        Capability::GalaxyClusterEdit,
    ];

    /// Stable kebab-case name
    pub fn name(&self) -> &'static str {
        match self {
            Capability::ResponseCompressionBrotli => "response-compression-brotli",
            Capability::ResponseCompressionGzip => "response-compression-gzip",
            Capability::SightingFilterDedup => "sighting-filter-dedup",
            Capability::ProtectedEventSigning => "protected-event-signing",
            Capability::SyncPermission => "sync-permission",
            Capability::GalaxyEditorPermission => "galaxy-editor-permission",
            Capability::ProposalSync => "proposal-sync",
            Capability::OrgScopedRules => "org-scoped-rules",
            Capability::SightingRestSearch => "sighting-rest-search",
            Capability::ConnectivitySelfTest => "connectivity-self-test",
            Capability::GalaxyClusterEdit => "galaxy-cluster-edit",
        }
    }

    /// The rule answering this capability
    pub fn rule(&self) -> CapabilityRule {
        match self {
            Capability::ResponseCompressionBrotli => CapabilityRule::RequestEncoding("br"),
            Capability::ResponseCompressionGzip => CapabilityRule::RequestEncoding("gzip"),
            Capability::SightingFilterDedup => CapabilityRule::Flag("filter_sightings"),
            Capability::ProtectedEventSigning => {
                CapabilityRule::MinVersion(VersionThreshold::new(2, 4, 156))
            }
            Capability::SyncPermission => CapabilityRule::Flag("perm_sync"),
            Capability::GalaxyEditorPermission => CapabilityRule::Flag("perm_galaxy_editor"),
            Capability::ProposalSync => CapabilityRule::MinVersion(VersionThreshold::new(2, 4, 111)),
            Capability::OrgScopedRules => {
                CapabilityRule::MinVersion(VersionThreshold::new(2, 4, 124))
            }
            Capability::SightingRestSearch => {
                CapabilityRule::MinVersion(VersionThreshold::new(2, 4, 165))
            }
            Capability::ConnectivitySelfTest => {
                CapabilityRule::MinVersion(VersionThreshold::new(2, 4, 69))
            }
            Capability::GalaxyClusterEdit => CapabilityRule::FieldPresent("perm_galaxy_editor"),
        }
    }

    /// Capabilities whose absence must abort the operation needing them
    ///
    /// When the capability probe fails, these re-raise the probe error
    /// instead of reporting "unsupported".
    pub fn is_required_for_correctness(&self) -> bool {
        matches!(self, Capability::ProtectedEventSigning)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown capability name
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown capability: {0}")]
pub struct UnknownCapability(pub String);

impl FromStr for Capability {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .iter()
            .copied()
            .find(|cap| cap.name() == s)
            .ok_or_else(|| UnknownCapability(s.to_string()))
    }
}
