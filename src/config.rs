use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_WAL_FILE: &str = "wal.log";
pub const DEFAULT_SNAPSHOT_FILE: &str = "store_data.json";
pub const DEFAULT_READ_DELAY: Duration = Duration::from_millis(500);

/// Read consistency of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    /// Reads return immediately
    #[default]
    Strong,
    /// Reads are delayed to simulate replication lag
    Eventual,
}

impl FromStr for Consistency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strong" => Ok(Self::Strong),
            "eventual" => Ok(Self::Eventual),
            other => bail!("Unknown consistency mode: {other}"),
        }
    }
}

impl std::fmt::Display for Consistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strong => f.write_str("strong"),
            Self::Eventual => f.write_str("eventual"),
        }
    }
}

/// Construction-time settings of a store. Changing them means opening a new store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub consistency: Consistency,
    /// Lifetime given to every put; `None` disables expiry
    pub ttl: Option<Duration>,
    /// Read delay applied in eventual mode
    pub read_delay: Duration,
    pub data_dir: PathBuf,
    pub wal_file: String,
    pub snapshot_file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            consistency: Consistency::Strong,
            ttl: None,
            read_delay: DEFAULT_READ_DELAY,
            data_dir: PathBuf::from("."),
            wal_file: DEFAULT_WAL_FILE.to_string(),
            snapshot_file: DEFAULT_SNAPSHOT_FILE.to_string(),
        }
    }
}

impl StoreConfig {
    /// Default settings rooted at `data_dir`
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Set the read consistency mode
    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Set the lifetime of every put; `None` disables expiry
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the read delay used in eventual mode
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Full path of the WAL file
    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(&self.wal_file)
    }

    /// Full path of the snapshot file
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(&self.snapshot_file)
    }

    /// Delay to apply to each read, if any
    pub fn effective_read_delay(&self) -> Option<Duration> {
        match self.consistency {
            Consistency::Eventual if !self.read_delay.is_zero() => Some(self.read_delay),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(ttl) = self.ttl {
            if ttl.is_zero() {
                bail!("TTL must be positive; use None to disable expiry");
            }
        }
        if self.wal_file.is_empty() || self.snapshot_file.is_empty() {
            bail!("WAL and snapshot file names must not be empty");
        }
        if self.wal_file == self.snapshot_file {
            bail!("WAL and snapshot must be different files");
        }
        Ok(())
    }
}
