//! Append-only per-device time-series history.
//!
//! The store records `(ts, Sample, DeviceHealth)` tuples, totally ordered by
//! timestamp per device. Two backends are provided: an in-memory ring for
//! the common case and a JSON-lines file log when durability is wanted. The
//! core is fully functional with purely in-memory history.
//!
//! File-backend write discipline: an entry either appears whole or not at
//! all. A torn trailing line (partial write at crash) is discarded on load;
//! corruption anywhere else quarantines the device, halting further appends.

use crate::error::{IoShelferError, Result};
use crate::types::{DeviceHealth, Sample};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// One recorded tuple in a device's history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Record timestamp; strictly increasing per device.
    pub ts: DateTime<Utc>,
    /// The raw sample observed.
    pub sample: Sample,
    /// The composed health record, absent for the raw-sample append that
    /// precedes classification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<DeviceHealth>,
}

/// Abstract time-series store.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append an entry. Rejects entries with `ts` at or before the last
    /// recorded timestamp for the device.
    async fn append(&self, device_id: &str, entry: HistoryEntry) -> Result<()>;

    /// Entries with `ts >= now - duration`, ascending. Returns whatever
    /// exists, including nothing.
    async fn window(&self, device_id: &str, duration: Duration) -> Result<Vec<HistoryEntry>>;

    /// Most recent entry, or `None`.
    async fn latest(&self, device_id: &str) -> Result<Option<HistoryEntry>>;

    /// Remove entries older than `now - retention` across all devices.
    /// Returns the number of removed entries. Concurrent readers observe a
    /// pre- or post-evict snapshot, never a torn view.
    async fn evict(&self, retention: Duration) -> Result<usize>;
}

// ============================================================================
// In-memory backend
// ============================================================================

/// In-memory ring per device.
#[derive(Default)]
pub struct MemoryHistory {
    inner: RwLock<HashMap<String, VecDeque<HistoryEntry>>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total entries held across all devices.
    pub fn len(&self) -> usize {
        self.inner.read().values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append(&self, device_id: &str, entry: HistoryEntry) -> Result<()> {
        let mut inner = self.inner.write();
        let log = inner.entry(device_id.to_string()).or_default();

        if let Some(last) = log.back() {
            if entry.ts <= last.ts {
                return Err(IoShelferError::OutOfOrderAppend {
                    device_id: device_id.to_string(),
                });
            }
        }

        log.push_back(entry);
        Ok(())
    }

    async fn window(&self, device_id: &str, duration: Duration) -> Result<Vec<HistoryEntry>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(duration)
                .map_err(|e| IoShelferError::Internal(e.to_string()))?;

        let inner = self.inner.read();
        Ok(inner
            .get(device_id)
            .map(|log| log.iter().filter(|e| e.ts >= cutoff).cloned().collect())
            .unwrap_or_default())
    }

    async fn latest(&self, device_id: &str) -> Result<Option<HistoryEntry>> {
        Ok(self
            .inner
            .read()
            .get(device_id)
            .and_then(|log| log.back().cloned()))
    }

    async fn evict(&self, retention: Duration) -> Result<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention)
                .map_err(|e| IoShelferError::Internal(e.to_string()))?;

        let mut removed = 0;
        let mut inner = self.inner.write();
        for log in inner.values_mut() {
            while log.front().map(|e| e.ts < cutoff).unwrap_or(false) {
                log.pop_front();
                removed += 1;
            }
        }
        Ok(removed)
    }
}

// ============================================================================
// File-backed backend
// ============================================================================

/// Per-device bookkeeping for the file backend.
#[derive(Default)]
struct DeviceLog {
    last_ts: Option<DateTime<Utc>>,
    /// Set when corruption was detected; appends are refused afterwards.
    quarantined: Option<String>,
    /// Whether `last_ts` was recovered from disk yet.
    loaded: bool,
}

/// JSON-lines log per device under a base directory.
pub struct FileHistory {
    base_dir: PathBuf,
    inner: Mutex<HashMap<String, DeviceLog>>,
}

impl FileHistory {
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir).map_err(|e| {
            IoShelferError::StorageIo(format!("failed to create history dir: {}", e))
        })?;
        Ok(Self {
            base_dir,
            inner: Mutex::new(HashMap::new()),
        })
    }

    /// Whether appends for the device were halted after corruption.
    pub async fn is_quarantined(&self, device_id: &str) -> bool {
        self.inner
            .lock()
            .await
            .get(device_id)
            .map(|l| l.quarantined.is_some())
            .unwrap_or(false)
    }

    fn path_for(&self, device_id: &str) -> PathBuf {
        let safe: String = device_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            })
            .collect();
        self.base_dir.join(format!("{}.jsonl", safe))
    }

    /// Load all whole entries from a log file. A parse failure on the final
    /// line is a torn write and is discarded; a failure anywhere else is
    /// corruption.
    fn load_entries(path: &Path) -> Result<Vec<HistoryEntry>> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(IoShelferError::StorageIo(format!(
                    "failed to read history log: {}",
                    e
                )))
            }
        };

        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut entries = Vec::with_capacity(lines.len());

        for (i, line) in lines.iter().enumerate() {
            match serde_json::from_str::<HistoryEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(_) if i + 1 == lines.len() => {
                    warn!(path = %path.display(), "discarding torn trailing history line");
                    break;
                }
                Err(e) => {
                    return Err(IoShelferError::StorageCorrupted {
                        device_id: path
                            .file_stem()
                            .map(|s| s.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                        reason: format!("bad record at line {}: {}", i + 1, e),
                    })
                }
            }
        }

        Ok(entries)
    }
}

#[async_trait]
impl HistoryStore for FileHistory {
    async fn append(&self, device_id: &str, entry: HistoryEntry) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let log = inner.entry(device_id.to_string()).or_default();

        if let Some(reason) = &log.quarantined {
            return Err(IoShelferError::StorageCorrupted {
                device_id: device_id.to_string(),
                reason: reason.clone(),
            });
        }

        let path = self.path_for(device_id);

        // Recover the last timestamp from disk on first touch so monotonicity
        // survives restarts.
        if !log.loaded {
            match Self::load_entries(&path) {
                Ok(entries) => {
                    log.last_ts = entries.last().map(|e| e.ts);
                    log.loaded = true;
                }
                Err(e @ IoShelferError::StorageCorrupted { .. }) => {
                    log.quarantined = Some(e.to_string());
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(last) = log.last_ts {
            if entry.ts <= last {
                return Err(IoShelferError::OutOfOrderAppend {
                    device_id: device_id.to_string(),
                });
            }
        }

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| IoShelferError::StorageIo(format!("failed to open log: {}", e)))?;
        file.write_all(line.as_bytes())
            .map_err(|e| IoShelferError::StorageIo(format!("failed to append: {}", e)))?;
        file.flush()
            .map_err(|e| IoShelferError::StorageIo(format!("failed to flush: {}", e)))?;

        log.last_ts = Some(entry.ts);
        Ok(())
    }

    async fn window(&self, device_id: &str, duration: Duration) -> Result<Vec<HistoryEntry>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(duration)
                .map_err(|e| IoShelferError::Internal(e.to_string()))?;

        let entries = Self::load_entries(&self.path_for(device_id))?;
        Ok(entries.into_iter().filter(|e| e.ts >= cutoff).collect())
    }

    async fn latest(&self, device_id: &str) -> Result<Option<HistoryEntry>> {
        let entries = Self::load_entries(&self.path_for(device_id))?;
        Ok(entries.into_iter().last())
    }

    async fn evict(&self, retention: Duration) -> Result<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention)
                .map_err(|e| IoShelferError::Internal(e.to_string()))?;

        // Hold the map lock for the whole pass: a short exclusive epoch that
        // keeps appenders out while files are rewritten. Readers are safe at
        // any point because the rewrite lands via atomic rename.
        let inner = self.inner.lock().await;
        let mut removed = 0;

        let dir = std::fs::read_dir(&self.base_dir)
            .map_err(|e| IoShelferError::StorageIo(format!("failed to list logs: {}", e)))?;

        for dir_entry in dir {
            let path = dir_entry
                .map_err(|e| IoShelferError::StorageIo(e.to_string()))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }

            let entries = match Self::load_entries(&path) {
                Ok(entries) => entries,
                // Quarantined logs are left in place for inspection.
                Err(IoShelferError::StorageCorrupted { .. }) => continue,
                Err(e) => return Err(e),
            };

            let retained: Vec<&HistoryEntry> =
                entries.iter().filter(|e| e.ts >= cutoff).collect();
            if retained.len() == entries.len() {
                continue;
            }
            removed += entries.len() - retained.len();

            let tmp = path.with_extension("jsonl.tmp");
            {
                let mut file = std::fs::File::create(&tmp).map_err(|e| {
                    IoShelferError::StorageIo(format!("failed to create tmp log: {}", e))
                })?;
                for entry in &retained {
                    let mut line = serde_json::to_string(entry)?;
                    line.push('\n');
                    file.write_all(line.as_bytes())
                        .map_err(|e| IoShelferError::StorageIo(e.to_string()))?;
                }
                file.flush()
                    .map_err(|e| IoShelferError::StorageIo(e.to_string()))?;
            }
            std::fs::rename(&tmp, &path)
                .map_err(|e| IoShelferError::StorageIo(format!("failed to swap log: {}", e)))?;
        }

        drop(inner);
        if removed > 0 {
            info!(removed, "evicted expired history entries");
        }
        Ok(removed)
    }
}
