//! Core types shared by the sync protocols

pub mod capability;
pub mod peer;
pub mod record;
pub mod sighting;

pub use capability::{Capability, CapabilityRule, UnknownCapability, VersionThreshold};
pub use peer::{AuthKey, PeerDescriptor, SyncRules};
pub use record::{Record, RecordKind};
pub use sighting::{sightings_from_event, Sighting, DEFAULT_ORG_ID};
