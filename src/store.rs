use crate::config::{Consistency, StoreConfig};
use crate::conflict::{self, IncomingWrite, Resolution};
use crate::ops::{StoreMap, WalRecord};
use crate::snapshot::SnapshotFile;
use crate::types::{self, Entry, Timestamp};
use crate::wal::WriteAheadLog;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, trace};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStatus {
    pub n_kvs: usize,
    pub wal_appended: u64,
    pub consistency: Consistency,
    pub ttl: Option<Duration>,
    pub wal_path: PathBuf,
    pub snapshot_path: PathBuf,
}

/// Mutable state - map, WAL and snapshot all behind one lock
struct StoreState {
    data: StoreMap,
    wal: WriteAheadLog,
    snapshot: SnapshotFile,
    ttl_secs: Option<f64>,
}

impl StoreState {
    /// Log, apply and snapshot a mutation.
    /// Every WAL-backed mutation goes through here.
    fn execute(&mut self, record: WalRecord) -> Result<()> {
        if record.is_noop(&self.data) {
            trace!("Skipping noop record: {record:?}");
            return Ok(());
        }
        self.wal.append(&record)?;
        record.apply(&mut self.data);
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        self.snapshot.save(&self.data)
    }

    fn put(&mut self, key: String, value: String) -> Result<Entry> {
        let entry = Entry::next_put(self.data.get(&key), value, types::now(), self.ttl_secs);
        self.execute(WalRecord::put(&key, &entry))?;
        Ok(entry)
    }

    /// Look up a live entry, evicting it if its expiry has passed
    fn get_live(&mut self, key: &str, now: Timestamp) -> Result<Option<Entry>> {
        let Some(entry) = self.data.get(key) else {
            return Ok(None);
        };
        if !entry.is_expired(now) {
            return Ok(Some(entry.clone()));
        }
        debug!(key, "Evicting expired entry");
        self.data.remove(key);
        self.persist()?;
        Ok(None)
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.execute(WalRecord::delete(key))
    }

    fn resolve_conflict(&mut self, key: &str, incoming: IncomingWrite) -> Result<bool> {
        let accepted = match conflict::resolve(self.data.get(key), incoming) {
            Resolution::Accept(entry) => {
                debug!(key, version = entry.version, "Accepted incoming write");
                self.data.insert(key.to_string(), entry);
                true
            }
            Resolution::KeepExisting => {
                debug!(key, "Rejected incoming write, local entry is newer");
                false
            }
        };
        // Conflict-resolved state is snapshotted but not logged, so a later
        // WAL replay can put an older value back.
        self.persist()?;
        Ok(accepted)
    }
}

/// A durable key-value store.
///
/// - In-memory map, loaded from the snapshot and the WAL replayed on top
/// - Puts and deletes are appended to the WAL, then the snapshot is rewritten
/// - Lazy TTL expiry, enforced on read
/// - LWW merging of out-of-band writes via [`Store::resolve_conflict`]
/// - A single mutex serializes every operation
pub struct Store {
    state: Mutex<StoreState>,
    config: StoreConfig,
}

impl Store {
    /// Open the store described by `config`, recovering any state on disk
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        fs_err::create_dir_all(&config.data_dir)?;

        let wal_path = config.wal_path();
        let snapshot = SnapshotFile::new(config.snapshot_path());
        let mut data = snapshot.load()?;
        if !data.is_empty() {
            info!("Loaded {} keys from snapshot {:?}", data.len(), snapshot.path());
        }

        let wal = WriteAheadLog::open(&wal_path)?;
        let replayed = wal
            .replay(&mut data)
            .with_context(|| format!("Failed to recover from WAL {wal_path:?}"))?;
        if replayed > 0 {
            info!("Recovered {} keys after replaying {replayed} WAL records", data.len());
        }

        let state = StoreState {
            data,
            wal,
            snapshot,
            ttl_secs: config.ttl.map(|ttl| ttl.as_secs_f64()),
        };

        info!(
            "Store opened: consistency={}, ttl={:?}, WAL={:?}, snapshot={:?}",
            config.consistency,
            config.ttl,
            wal_path,
            state.snapshot.path()
        );
        Ok(Self {
            state: Mutex::new(state),
            config,
        })
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("Failed to lock store state")
    }

    /// Store `value` under `key`, bumping its version. Returns the written entry.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) -> Result<Entry> {
        self.lock().put(key.into(), value.into())
    }

    /// Read the value under `key`; `None` if absent or expired
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get_entry(key)?.map(|entry| entry.value))
    }

    /// Read the full entry under `key`; `None` if absent or expired.
    ///
    /// In eventual mode a hit is held back for the configured read delay; misses
    /// return at once. The delay runs after the lock is released, so it does
    /// not stall other operations.
    pub fn get_entry(&self, key: &str) -> Result<Option<Entry>> {
        let entry = self.lock().get_live(key, types::now())?;
        if entry.is_some() {
            if let Some(delay) = self.config.effective_read_delay() {
                std::thread::sleep(delay);
            }
        }
        Ok(entry)
    }

    /// Remove `key`. Deleting an absent key does nothing.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.lock().delete(key)
    }

    /// Merge a write made elsewhere using last-write-wins on `timestamp`.
    ///
    /// Returns whether the incoming write replaced the local state. The result
    /// is written to the snapshot only, not to the WAL.
    pub fn resolve_conflict(
        &self,
        key: &str,
        value: impl Into<String>,
        version: u64,
        timestamp: Timestamp,
    ) -> Result<bool> {
        let incoming = IncomingWrite {
            value: value.into(),
            version,
            timestamp,
        };
        self.lock().resolve_conflict(key, incoming)
    }

    /// All entries that have not expired, sorted by key. Nothing is evicted.
    pub fn entries(&self) -> Vec<(String, Entry)> {
        let now = types::now();
        let state = self.lock();
        let mut entries: Vec<_> = state
            .data
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Get store status (for debugging/monitoring)
    pub fn status(&self) -> StoreStatus {
        let state = self.lock();
        StoreStatus {
            n_kvs: state.data.len(),
            wal_appended: state.wal.appended(),
            consistency: self.config.consistency,
            ttl: self.config.ttl,
            wal_path: state.wal.path().to_path_buf(),
            snapshot_path: state.snapshot.path().to_path_buf(),
        }
    }
}
