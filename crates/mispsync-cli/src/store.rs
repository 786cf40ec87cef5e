//! JSONL file store for pulled sightings
//!
//! One line per sighting: `{"event_uuid": "...", "sighting": {...}}`.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use mispsync_core::{Sighting, SightingStore, SyncError, SyncResult};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Serialize)]
struct StoredSighting<'a> {
    event_uuid: &'a str,
    sighting: &'a Sighting,
}

pub struct JsonlSightingStore {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlSightingStore {
    /// Open `path` for appending, creating it if needed
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl SightingStore for JsonlSightingStore {
    fn bulk_save(&self, event_uuid: &str, sightings: &[Sighting]) -> SyncResult<usize> {
        let mut writer = self.writer.lock();
        for sighting in sightings {
            let line = serde_json::to_string(&StoredSighting {
                event_uuid,
                sighting,
            })
            .map_err(|e| SyncError::Store(e.to_string()))?;
            writeln!(writer, "{}", line).map_err(|e| SyncError::Store(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| SyncError::Store(e.to_string()))?;
        Ok(sightings.len())
    }
}
