//! Audit trail of exchanges with peers.
//!
//! Every request that produced a response is timed and handed to an
//! [`AuditSink`]. With sync auditing enabled, outbound payloads of
//! create/update/upload calls are handed over as well.
//!
//! Sinks are best-effort: the transport logs a failing sink at `warn` and
//! carries on.
//!
//! ## Sinks
//!
//! - [`TracingAuditSink`]: emits records as `tracing` events (default)
//! - [`JsonlAuditSink`]: append-only JSON lines file per peer
//! - [`MemoryAuditSink`]: keeps records in memory for inspection
//!
//! ## Querying JSONL audit files
//!
//! ```bash
//! # Slow exchanges
//! jq 'select(.duration_ms > 1000)' audit/*.jsonl
//!
//! # Failed pushes
//! jq 'select(.method == "POST" and .status >= 400)' audit/*.jsonl
//! ```

pub mod entry;
pub mod writer;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::SyncResult;

pub use entry::{ExchangeRecord, PayloadRecord};
pub use writer::{read_exchanges, JsonlAuditSink};

/// Receiver of audit records
pub trait AuditSink: Send + Sync {
    fn record_exchange(&self, record: &ExchangeRecord) -> SyncResult<()>;

    /// Outbound payload hook, only called when sync auditing is enabled
    fn record_payload(&self, record: &PayloadRecord) -> SyncResult<()> {
        let _ = record;
        Ok(())
    }
}

/// Emits audit records through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record_exchange(&self, record: &ExchangeRecord) -> SyncResult<()> {
        info!(
            target: "mispsync::audit",
            peer_id = record.peer_id,
            method = %record.method,
            url = %record.url,
            status = record.status,
            response_size = record.response_size,
            duration_ms = record.duration_ms,
            request_encoding = record.request_encoding.as_deref().unwrap_or(""),
            response_encoding = record.response_encoding.as_deref().unwrap_or(""),
            "{}",
            record.to_access_line()
        );
        Ok(())
    }

    fn record_payload(&self, record: &PayloadRecord) -> SyncResult<()> {
        debug!(
            target: "mispsync::audit",
            peer_id = record.peer_id,
            payload_len = record.payload.len(),
            "{}",
            record.message
        );
        Ok(())
    }
}

/// Collects audit records in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    exchanges: Mutex<Vec<ExchangeRecord>>,
    payloads: Mutex<Vec<PayloadRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exchanges(&self) -> Vec<ExchangeRecord> {
        self.exchanges.lock().clone()
    }

    pub fn payloads(&self) -> Vec<PayloadRecord> {
        self.payloads.lock().clone()
    }

    pub fn clear(&self) {
        self.exchanges.lock().clear();
        self.payloads.lock().clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn record_exchange(&self, record: &ExchangeRecord) -> SyncResult<()> {
        self.exchanges.lock().push(record.clone());
        Ok(())
    }

    fn record_payload(&self, record: &PayloadRecord) -> SyncResult<()> {
        self.payloads.lock().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_memory_sink_collects() {
        let sink = MemoryAuditSink::new();
        let record = ExchangeRecord {
            ts: Utc::now(),
            peer_id: 1,
            method: "HEAD".to_string(),
            url: "https://peer/events/view/u1".to_string(),
            status: 404,
            response_size: 0,
            duration_ms: 1,
            request_encoding: None,
            response_encoding: None,
        };
        sink.record_exchange(&record).unwrap();
        assert_eq!(sink.exchanges(), vec![record]);

        sink.clear();
        assert!(sink.exchanges().is_empty());
    }

    #[test]
    fn test_default_payload_hook_is_noop() {
        struct CountOnly;
        impl AuditSink for CountOnly {
            fn record_exchange(&self, _: &ExchangeRecord) -> SyncResult<()> {
                Ok(())
            }
        }

        let payload = PayloadRecord {
            ts: Utc::now(),
            peer_id: 1,
            message: "m".to_string(),
            payload: "{}".to_string(),
        };
        assert!(CountOnly.record_payload(&payload).is_ok());
    }
}
