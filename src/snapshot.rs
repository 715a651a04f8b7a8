use crate::ops::StoreMap;
use anyhow::{Context, Result};
use fs_err::{self as fs, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Full-state snapshot file, rewritten wholesale on every mutation
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Load the snapshot, or an empty map if none has been written yet
    pub fn load(&self) -> Result<StoreMap> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(StoreMap::new()),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to deserialize snapshot {:?}", self.path))
    }

    /// Write `map` to a temporary file and rename it over the snapshot
    pub fn save(&self, map: &StoreMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let encoded = serde_json::to_vec_pretty(map).context("Failed to encode snapshot")?;

        {
            let mut writer = BufWriter::new(
                OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&tmp_path)?,
            );
            writer.write_all(&encoded)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;

        if let Some(parent) = self.path.parent() {
            if let Ok(dir_file) = File::open(parent) {
                let _ = dir_file.sync_all();
            }
        }

        debug!("Saved snapshot with {} keys to {:?}", map.len(), self.path);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Entry;
    use tempfile::TempDir;

    #[test]
    fn test_missing_snapshot_is_empty() {
        let dir = TempDir::new().unwrap();
        let snapshot = SnapshotFile::new(dir.path().join("store_data.json"));
        assert!(snapshot.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_overwrites_whole_file() {
        let dir = TempDir::new().unwrap();
        let snapshot = SnapshotFile::new(dir.path().join("store_data.json"));

        let mut map = StoreMap::new();
        map.insert("a".into(), Entry::new("1".into(), 1, 1.5, Some(11.5)));
        map.insert("b".into(), Entry::new("2".into(), 4, 2.5, None));
        snapshot.save(&map).unwrap();
        assert_eq!(snapshot.load().unwrap(), map);

        map.remove("a");
        snapshot.save(&map).unwrap();
        let loaded = snapshot.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["b"].version, 4);
        assert!(!dir.path().join("store_data.json.tmp").exists());
    }

    #[test]
    fn test_file_is_key_to_entry_object() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store_data.json");
        let snapshot = SnapshotFile::new(&path);

        let mut map = StoreMap::new();
        map.insert("k".into(), Entry::new("v".into(), 2, 3.0, None));
        snapshot.save(&map).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["k"]["value"], "v");
        assert_eq!(json["k"]["version"], 2);
        assert!(json["k"]["expiry"].is_null());
    }

    #[test]
    fn test_corrupt_snapshot_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store_data.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(SnapshotFile::new(&path).load().is_err());
    }
}
