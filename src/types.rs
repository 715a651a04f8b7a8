use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch, with sub-second precision
pub type Timestamp = f64;

/// Current wall-clock time in seconds
pub fn now() -> Timestamp {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// A stored value with its write metadata
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    pub value: String,
    /// Number of puts applied to the key since it was last absent, starting at 1
    pub version: u64,
    pub timestamp: Timestamp,
    /// Absolute expiry time; `None` means the entry never expires
    #[serde(default)]
    pub expiry: Option<Timestamp>,
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("value_len", &self.value.len())
            .field("version", &self.version)
            .field("timestamp", &self.timestamp)
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl Entry {
    /// Create an entry from its parts
    pub fn new(value: String, version: u64, timestamp: Timestamp, expiry: Option<Timestamp>) -> Self {
        Self {
            value,
            version,
            timestamp,
            expiry,
        }
    }

    /// Build the entry a put produces on top of `previous`
    pub fn next_put(
        previous: Option<&Entry>,
        value: String,
        timestamp: Timestamp,
        ttl_secs: Option<f64>,
    ) -> Self {
        let version = previous.map(|e| e.version + 1).unwrap_or(1);
        let expiry = ttl_secs.map(|ttl| timestamp + ttl);
        Self::new(value, version, timestamp, expiry)
    }

    /// Check if the entry's expiry has passed at `now`
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expiry.is_some_and(|expiry| now > expiry)
    }
}
