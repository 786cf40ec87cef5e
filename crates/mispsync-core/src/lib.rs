//! mispsync core library
//!
//! Federation sync client for threat-intelligence instances: capability
//! negotiation, signed and compressed payloads, and the push/pull
//! algorithms for events, galaxy clusters, sightings and proposals.
//!
//! ## Overview
//!
//! One [`SyncTransport`] is built per peer and sync job. It probes the
//! peer's version once, then every protocol borrows it. The core does no
//! I/O of its own beyond what it asks of its collaborators:
//!
//! - [`HttpClient`]: sends requests (pooling, TLS, timeouts, cancellation)
//! - [`Signer`]: signs protected payloads
//! - [`SightingStore`]: saves pulled sightings
//! - [`AuditSink`]: records every timed exchange
//!
//! ## Core Principles
//!
//! - **Fail closed on optional features**: an unreachable or confused peer
//!   is treated as supporting nothing optional
//! - **Never send unsigned protected data**: missing signature support is
//!   an error before anything is posted
//! - **Best-effort pulls**: one bad record never aborts a batch
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use mispsync_core::{AuthKey, EventSync, PeerDescriptor, Record, SyncConfig, SyncTransport};
//!
//! let peer = PeerDescriptor::new(3, "partner", "https://misp.partner.example", AuthKey::new(key))?;
//! let transport = SyncTransport::new(peer, SyncConfig::default(), client)?;
//!
//! let event = Record::event(serde_json::json!({"Event": {"uuid": "...", "info": "..."}}))?;
//! EventSync::new(&transport).push(&event).await?;
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod http;
pub mod signer;
pub mod sync;
pub mod types;

// Re-exports
pub use audit::{AuditSink, JsonlAuditSink, MemoryAuditSink, TracingAuditSink};
pub use config::SyncConfig;
pub use error::{PeerHttpError, SyncError, SyncResult};
pub use http::{HttpClient, HttpRequest, HttpResponse, Method, TransportError};
pub use signer::{Ed25519Signer, Signer};
pub use sync::{
    EventSync, GalaxyClusterSync, NamedParams, PeerCapabilities, PostOptions, ProposalSync,
    RecordSync, SightingStore, SightingSync, SyncResponse, SyncTransport,
};
pub use types::*;
