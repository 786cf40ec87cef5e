//! Peer synchronization over HTTP
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  EventSync / RecordSync     SightingSync    GalaxyClusterSync   │
//! │  (push race handling,       (dedup filter,  ProposalSync        │
//! │   best-effort pull)          bulk upload)                       │
//! │              │                     │                │           │
//! │              └──────────┬──────────┴────────────────┘           │
//! │                         ▼                                       │
//! │  SyncTransport (one per peer)                                   │
//! │  ├── VersionGate   (capabilities, probed once)                  │
//! │  ├── codec         (JSON, brotli/gzip, signature, ETag)         │
//! │  ├── AuditSink     (timed exchange records)                     │
//! │  └── HttpClient    (supplied by the caller)                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let transport = SyncTransport::new(peer, SyncConfig::default(), client)?
//!     .with_signer(Arc::new(signer));
//!
//! // Push an event, creating or updating it as needed
//! let response = EventSync::new(&transport).push(&event).await?;
//!
//! // Push sightings the peer does not have yet
//! let report = SightingSync::new(&transport)
//!     .push_for_event(event_uuid, sightings)
//!     .await?;
//! ```

pub mod codec;
pub mod galaxy;
pub mod params;
pub mod proposals;
pub mod records;
pub mod sightings;
pub mod transport;
pub mod version_gate;

pub use codec::{CompressionSupport, ContentEncoding};
pub use galaxy::GalaxyClusterSync;
pub use params::NamedParams;
pub use proposals::{ProposalOutcome, ProposalSync};
pub use records::{
    ids_newer_than, EventIndexEntry, EventSync, IndexOutcome, PullReport, PushStep, PushTarget,
    RecordSync, SkippedRecord,
};
pub use sightings::{SightingPullReport, SightingPushReport, SightingStore, SightingSync};
pub use transport::{PostOptions, PostTestOutcome, SyncResponse, SyncTransport};
pub use version_gate::{PeerCapabilities, VersionGate};
