// Persistence of generated segment banks, keyed by source filename.
//
// `SegmentRecord` is the stored shape of a bank: the segment symbol lists,
// the parallel duration lists, and the key label as text. Converting back
// into a `SegmentBank` re-validates every segment, so a hand-edited or
// truncated record is rejected rather than reaching the composer.
//
// `SegmentStore` has "insert if absent, else overwrite" semantics keyed by
// filename. Two implementations:
// - `MemoryStore`: an ordered map, for tests and one-shot runs.
// - `JsonFileStore`: one JSON object `{filename: record}` on disk. Every
//   write rewrites the whole file through a sibling temp file and a rename,
//   so readers never observe a half-written store.
//
// Stores are only touched after a generation run completes.

use crate::error::{SegmentError, StoreError};
use crate::key::KeyLabel;
use crate::segment::{Segment, SegmentBank};
use crate::symbol::Symbol;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub sequences: Vec<Vec<Symbol>>,
    pub durations: Vec<Vec<f64>>,
    /// Key label text ("C major"), empty when unknown.
    #[serde(default)]
    pub key: String,
}

impl SegmentRecord {
    pub fn from_bank(bank: &SegmentBank) -> Self {
        SegmentRecord {
            sequences: bank.iter().map(|s| s.symbols().to_vec()).collect(),
            durations: bank.iter().map(|s| s.durations().to_vec()).collect(),
            key: bank.key().map(|k| k.to_string()).unwrap_or_default(),
        }
    }

    /// Rebuild the bank, validating each segment.
    pub fn into_bank(self, source: &str) -> Result<SegmentBank, SegmentError> {
        let key = if self.key.trim().is_empty() {
            None
        } else {
            match self.key.parse::<KeyLabel>() {
                Ok(key) => Some(key),
                Err(e) => {
                    log::warn!("{source}: {e}; loading without a key");
                    None
                }
            }
        };

        let count = self.sequences.len().max(self.durations.len());
        let mut sequences = self.sequences.into_iter();
        let mut durations = self.durations.into_iter();
        let mut bank = SegmentBank::new(source, key);
        for ordinal in 0..count {
            let symbols = sequences.next().unwrap_or_default();
            let lengths = durations.next().unwrap_or_default();
            bank.push(Segment::new(source, ordinal, symbols, lengths)?);
        }
        Ok(bank)
    }
}

/// Filename-keyed storage of segment records.
pub trait SegmentStore {
    /// Insert `record` under `filename`, replacing any existing record.
    fn upsert(&mut self, filename: &str, record: SegmentRecord) -> Result<(), StoreError>;

    fn fetch(&self, filename: &str) -> Result<Option<SegmentRecord>, StoreError>;

    /// Stored filenames, sorted.
    fn filenames(&self) -> Result<Vec<String>, StoreError>;

    /// Fetch and validate a stored bank.
    fn fetch_bank(&self, filename: &str) -> Result<Option<SegmentBank>, StoreError> {
        let Some(record) = self.fetch(filename)? else {
            return Ok(None);
        };
        record
            .into_bank(filename)
            .map(Some)
            .map_err(|source| StoreError::Segment {
                filename: filename.to_string(),
                source,
            })
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, SegmentRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl SegmentStore for MemoryStore {
    fn upsert(&mut self, filename: &str, record: SegmentRecord) -> Result<(), StoreError> {
        self.records.insert(filename.to_string(), record);
        Ok(())
    }

    fn fetch(&self, filename: &str) -> Result<Option<SegmentRecord>, StoreError> {
        Ok(self.records.get(filename).cloned())
    }

    fn filenames(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.records.keys().cloned().collect())
    }
}

/// A store backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Use `path` as the store file. It is created on the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, SegmentRecord>, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_str(&text).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, records: &BTreeMap<String, SegmentRecord>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(records).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl SegmentStore for JsonFileStore {
    fn upsert(&mut self, filename: &str, record: SegmentRecord) -> Result<(), StoreError> {
        let mut records = self.load()?;
        let replaced = records.insert(filename.to_string(), record).is_some();
        self.save(&records)?;
        log::info!(
            "{} '{filename}' in {}",
            if replaced { "updated" } else { "stored" },
            self.path.display()
        );
        Ok(())
    }

    fn fetch(&self, filename: &str) -> Result<Option<SegmentRecord>, StoreError> {
        Ok(self.load()?.remove(filename))
    }

    fn filenames(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.load()?.into_keys().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyMode;

    fn record(first: &str, key: &str) -> SegmentRecord {
        SegmentRecord {
            sequences: vec![
                vec![Symbol::from(first), Symbol::from("D4")],
                vec![Symbol::from("rest")],
            ],
            durations: vec![vec![1.0, 0.5], vec![2.0]],
            key: key.to_string(),
        }
    }

    #[test]
    fn test_memory_upsert_overwrites() {
        let mut store = MemoryStore::new();
        store.upsert("song.mid", record("C4", "C major")).unwrap();
        store.upsert("song.mid", record("E4", "a minor")).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.fetch("song.mid").unwrap(),
            Some(record("E4", "a minor"))
        );
        assert_eq!(store.fetch("other.mid").unwrap(), None);
    }

    #[test]
    fn test_file_store_upsert_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segments.json");
        let mut store = JsonFileStore::new(&path);
        assert_eq!(store.fetch("song.mid").unwrap(), None);

        store.upsert("song.mid", record("C4", "C major")).unwrap();
        store.upsert("other.mid", record("G4", "")).unwrap();
        store.upsert("song.mid", record("E4", "a minor")).unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(
            reopened.filenames().unwrap(),
            vec!["other.mid".to_string(), "song.mid".to_string()]
        );
        assert_eq!(
            reopened.fetch("song.mid").unwrap(),
            Some(record("E4", "a minor"))
        );
        assert!(!dir.path().join("segments.json.tmp").exists());
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segments.json");
        fs::write(&path, "not json").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(matches!(
            store.fetch("x"),
            Err(StoreError::Json { .. })
        ));
    }

    #[test]
    fn test_bank_roundtrip() {
        let bank = record("C4", "g minor").into_bank("song.mid").unwrap();
        assert_eq!(bank.len(), 2);
        assert_eq!(bank.key(), Some(KeyLabel::new(7, KeyMode::Minor)));
        assert_eq!(bank.segments()[1].ordinal(), 1);
        assert_eq!(SegmentRecord::from_bank(&bank), record("C4", "g minor"));
    }

    #[test]
    fn test_bank_without_key() {
        let bank = record("C4", "").into_bank("a").unwrap();
        assert_eq!(bank.key(), None);
        let bank = record("C4", "mystery").into_bank("a").unwrap();
        assert_eq!(bank.key(), None);
    }

    #[test]
    fn test_invalid_record_rejected() {
        let mut bad = record("C4", "");
        bad.durations.pop();
        let mut store = MemoryStore::new();
        store.upsert("bad.mid", bad).unwrap();
        let err = store.fetch_bank("bad.mid").unwrap_err();
        assert!(matches!(
            err,
            StoreError::Segment {
                source: SegmentError::LengthMismatch { ordinal: 1, .. },
                ..
            }
        ));
        assert!(store.fetch_bank("missing.mid").unwrap().is_none());
    }
}
