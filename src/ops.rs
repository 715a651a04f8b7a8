use crate::types::{Entry, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The in-memory key space
pub type StoreMap = HashMap<String, Entry>;

/// Mutations recorded in the write-ahead log, one per line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum WalRecord {
    /// Overwrite the key with a complete entry
    Put {
        key: String,
        value: String,
        version: u64,
        timestamp: Timestamp,
        #[serde(default)]
        expiry: Option<Timestamp>,
    },

    /// Remove the key if present
    Delete { key: String },
}

impl WalRecord {
    pub fn put(key: &str, entry: &Entry) -> Self {
        Self::Put {
            key: key.to_string(),
            value: entry.value.clone(),
            version: entry.version,
            timestamp: entry.timestamp,
            expiry: entry.expiry,
        }
    }

    pub fn delete(key: &str) -> Self {
        Self::Delete {
            key: key.to_string(),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }

    /// Check whether applying the record would leave `map` unchanged
    pub fn is_noop(&self, map: &StoreMap) -> bool {
        match self {
            Self::Put { .. } => false,
            Self::Delete { key } => !map.contains_key(key),
        }
    }

    /// Apply the record to `map`; the only way replay mutates state
    pub fn apply(self, map: &mut StoreMap) {
        match self {
            Self::Put {
                key,
                value,
                version,
                timestamp,
                expiry,
            } => {
                map.insert(key, Entry::new(value, version, timestamp, expiry));
            }
            Self::Delete { key } => {
                map.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_form_has_op_tag() {
        let entry = Entry::new("1".into(), 3, 100.5, Some(110.5));
        let line = serde_json::to_string(&WalRecord::put("a", &entry)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(json["op"], "put");
        assert_eq!(json["key"], "a");
        assert_eq!(json["version"], 3);
        assert_eq!(json["expiry"], 110.5);

        let line = serde_json::to_string(&WalRecord::delete("a")).unwrap();
        assert_eq!(line, r#"{"op":"delete","key":"a"}"#);
    }

    #[test]
    fn test_put_without_expiry_field() {
        let record: WalRecord =
            serde_json::from_str(r#"{"op":"put","key":"k","value":"v","version":1,"timestamp":1.0}"#)
                .unwrap();
        let mut map = StoreMap::new();
        record.apply(&mut map);
        assert_eq!(map["k"].expiry, None);
    }

    #[test]
    fn test_apply_delete_absent_is_noop() {
        let mut map = StoreMap::new();
        let record = WalRecord::delete("missing");
        assert!(record.is_noop(&map));
        record.apply(&mut map);
        assert!(map.is_empty());
    }

    #[test]
    fn test_put_overwrites_unconditionally() {
        let mut map = StoreMap::new();
        map.insert("k".into(), Entry::new("new".into(), 5, 200.0, None));
        WalRecord::put("k", &Entry::new("old".into(), 1, 100.0, None)).apply(&mut map);
        assert_eq!(map["k"].value, "old");
        assert_eq!(map["k"].version, 1);
    }
}
