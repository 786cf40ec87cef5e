//! JSONL file sink for per-peer audit logs.
//!
//! Each peer writes to its own append-only file, so several transports can
//! audit concurrently without interleaving partial lines.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::entry::{ExchangeRecord, PayloadRecord};
use super::AuditSink;
use crate::error::{SyncError, SyncResult};

/// Sink that appends audit records to a JSONL file.
///
/// ```text
/// audit/
/// ├── 2026-01-21_peer-3.jsonl           # exchange records
/// └── 2026-01-21_peer-3.payloads.jsonl  # outbound payloads (sync audit)
/// ```
pub struct JsonlAuditSink {
    exchanges: Mutex<BufWriter<File>>,
    payloads: Mutex<BufWriter<File>>,
    path: PathBuf,
    payload_path: PathBuf,
}

fn open_append(path: &Path) -> std::io::Result<BufWriter<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::new(file))
}

impl JsonlAuditSink {
    /// Open (or create) today's audit files for `peer_id` under `dir`
    pub fn new(dir: impl AsRef<Path>, peer_id: u64) -> std::io::Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let date = chrono::Local::now().format("%Y-%m-%d");
        let path = dir.join(format!("{}_peer-{}.jsonl", date, peer_id));
        let payload_path = dir.join(format!("{}_peer-{}.payloads.jsonl", date, peer_id));

        Ok(Self {
            exchanges: Mutex::new(open_append(&path)?),
            payloads: Mutex::new(open_append(&payload_path)?),
            path,
            payload_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn payload_path(&self) -> &Path {
        &self.payload_path
    }

    fn append(writer: &Mutex<BufWriter<File>>, line: &str) -> SyncResult<()> {
        let mut writer = writer.lock();
        writeln!(writer, "{}", line).map_err(|e| SyncError::Audit(e.to_string()))?;
        writer.flush().map_err(|e| SyncError::Audit(e.to_string()))
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.exchanges.lock().flush()?;
        self.payloads.lock().flush()
    }
}

impl AuditSink for JsonlAuditSink {
    fn record_exchange(&self, record: &ExchangeRecord) -> SyncResult<()> {
        let line = record
            .to_json_line()
            .map_err(|e| SyncError::Audit(e.to_string()))?;
        Self::append(&self.exchanges, &line)
    }

    fn record_payload(&self, record: &PayloadRecord) -> SyncResult<()> {
        let line = record
            .to_json_line()
            .map_err(|e| SyncError::Audit(e.to_string()))?;
        Self::append(&self.payloads, &line)
    }
}

impl Drop for JsonlAuditSink {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Read exchange records back from a JSONL audit file
///
/// Lines that fail to parse are skipped.
pub fn read_exchanges(path: impl AsRef<Path>) -> std::io::Result<Vec<ExchangeRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(record) = serde_json::from_str::<ExchangeRecord>(&line) {
            records.push(record);
        }
    }
    Ok(records)
}
