use crate::ops::{StoreMap, WalRecord};
use anyhow::{anyhow, bail, Context as _, Result};
use fs_err::{self as fs, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, trace, warn};

/// Append-only, newline-delimited JSON write-ahead log
pub struct WriteAheadLog {
    file_path: PathBuf,
    writer: Option<BufWriter<File>>,
    /// Records appended through this handle
    appended: u64,
}

impl WriteAheadLog {
    /// Create or open a WAL file for appending.
    ///
    /// An unterminated last line is repaired first, so new records always
    /// start on a line of their own.
    pub fn open<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let file_path = file_path.as_ref().to_path_buf();
        repair_tail(&file_path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;
        info!("Opened WAL file: {:?}", file_path);
        Ok(Self {
            file_path,
            writer: Some(BufWriter::new(file)),
            appended: 0,
        })
    }

    /// Append a record and sync it to stable storage before returning
    pub fn append(&mut self, record: &WalRecord) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("WAL writer not initialized"))?;

        let mut line = serde_json::to_string(record).context("Failed to encode WAL record")?;
        line.push('\n');
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_data()?;

        self.appended += 1;
        trace!("Wrote WAL record #{}: {record:?}", self.appended);
        Ok(())
    }

    /// Read every record in file order, applying each to `map`.
    ///
    /// A missing file is an empty log. A record that fails to parse aborts the
    /// replay, unless it is the unterminated last line of the file, which is
    /// what an interrupted append leaves behind; that line is skipped.
    pub fn replay(&self, map: &mut StoreMap) -> Result<usize> {
        let records = read_records(&self.file_path)?;
        let count = records.len();
        for record in records {
            record.apply(map);
        }
        info!("Replayed {count} records from WAL: {:?}", self.file_path);
        Ok(count)
    }

    /// Number of records appended through this handle since it was opened
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Flush and close the WAL
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
            info!("Closed WAL: {:?}", self.file_path);
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

impl Drop for WriteAheadLog {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("Error closing WAL in drop: {e}");
        }
    }
}

/// Terminate or cut off an unterminated last line.
///
/// A last line that parses only lost its newline and gets one appended. One
/// that does not is the remains of an interrupted append and is truncated.
fn repair_tail(path: &Path) -> Result<()> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    if content.is_empty() || content.ends_with(b"\n") {
        return Ok(());
    }

    let tail_start = content
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|pos| pos + 1)
        .unwrap_or(0);
    let tail = &content[tail_start..];

    if serde_json::from_slice::<WalRecord>(tail).is_ok() {
        let mut file = OpenOptions::new().append(true).open(path)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        warn!("Terminated unterminated last WAL record in {:?}", path);
    } else {
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(tail_start as u64)?;
        file.sync_all()?;
        warn!(
            "Truncated {} bytes of torn WAL record from {:?}",
            tail.len(),
            path
        );
    }
    Ok(())
}

/// Parse all records of the log at `path`
pub fn read_records(path: &Path) -> Result<Vec<WalRecord>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut records = Vec::new();
    for (index, raw) in content.split_inclusive('\n').enumerate() {
        let line_no = index + 1;
        let terminated = raw.ends_with('\n');
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<WalRecord>(line) {
            Ok(record) => records.push(record),
            Err(err) if !terminated => {
                warn!(
                    "Ignoring torn WAL record at {:?} line {line_no}: {err}",
                    path
                );
            }
            Err(err) => {
                bail!("Malformed WAL record at {:?} line {line_no}: {err}", path);
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Entry;
    use tempfile::TempDir;

    #[test]
    fn test_missing_log_is_empty() {
        let dir = TempDir::new().unwrap();
        let records = read_records(&dir.path().join("nope.log")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_append_and_replay_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wal.log");

        let mut wal = WriteAheadLog::open(&path).unwrap();
        wal.append(&WalRecord::put("a", &Entry::new("1".into(), 1, 1.0, None)))
            .unwrap();
        wal.append(&WalRecord::put("b", &Entry::new("2".into(), 1, 2.0, None)))
            .unwrap();
        wal.append(&WalRecord::delete("a")).unwrap();
        wal.append(&WalRecord::delete("zzz")).unwrap();
        assert_eq!(wal.appended(), 4);
        drop(wal);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 4);

        let wal = WriteAheadLog::open(&path).unwrap();
        let mut map = StoreMap::new();
        assert_eq!(wal.replay(&mut map).unwrap(), 4);
        assert_eq!(map.len(), 1);
        assert_eq!(map["b"].value, "2");
    }

    #[test]
    fn test_reopen_appends_instead_of_truncating() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wal.log");

        let mut wal = WriteAheadLog::open(&path).unwrap();
        wal.append(&WalRecord::delete("a")).unwrap();
        drop(wal);
        let mut wal = WriteAheadLog::open(&path).unwrap();
        wal.append(&WalRecord::delete("b")).unwrap();
        drop(wal);

        let records = read_records(&path).unwrap();
        assert_eq!(
            records,
            vec![WalRecord::delete("a"), WalRecord::delete("b")]
        );
    }

    #[test]
    fn test_malformed_line_aborts_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wal.log");
        std::fs::write(
            &path,
            "{\"op\":\"delete\",\"key\":\"a\"}\nnot json\n{\"op\":\"delete\",\"key\":\"b\"}\n",
        )
        .unwrap();

        let err = read_records(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }

    #[test]
    fn test_unknown_op_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wal.log");
        std::fs::write(&path, "{\"op\":\"truncate\",\"key\":\"a\"}\n").unwrap();
        assert!(read_records(&path).is_err());
    }

    #[test]
    fn test_open_truncates_torn_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wal.log");
        std::fs::write(
            &path,
            "{\"op\":\"delete\",\"key\":\"a\"}\n{\"op\":\"put\",\"key\":\"b\",\"val",
        )
        .unwrap();

        let mut wal = WriteAheadLog::open(&path).unwrap();
        wal.append(&WalRecord::delete("c")).unwrap();
        drop(wal);

        let records = read_records(&path).unwrap();
        assert_eq!(records, vec![WalRecord::delete("a"), WalRecord::delete("c")]);
    }

    #[test]
    fn test_open_terminates_complete_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wal.log");
        std::fs::write(&path, "{\"op\":\"delete\",\"key\":\"a\"}").unwrap();

        let mut wal = WriteAheadLog::open(&path).unwrap();
        wal.append(&WalRecord::delete("b")).unwrap();
        drop(wal);

        let records = read_records(&path).unwrap();
        assert_eq!(records, vec![WalRecord::delete("a"), WalRecord::delete("b")]);
    }

    #[test]
    fn test_torn_tail_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wal.log");
        std::fs::write(
            &path,
            "\n{\"op\":\"delete\",\"key\":\"a\"}\n{\"op\":\"put\",\"key\":\"b\",\"val",
        )
        .unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records, vec![WalRecord::delete("a")]);
    }
}
