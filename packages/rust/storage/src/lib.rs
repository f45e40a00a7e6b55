//! File-backed storage for the FoldScape catalog.
//!
//! The record store is a single JSON document (`repos.json`) with a companion
//! `metadata.json`; historical star counts live in dated snapshot files under
//! `historical/`. See [`RecordStore`] and [`SnapshotStore`].
//!
//! Every write goes to a hidden sibling temp file first and is renamed over
//! the target, so readers never observe a half-written document.

mod snapshots;

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use foldscape_shared::{CollectionMetadata, FoldscapeError, Record, Result, document_records};

pub use snapshots::{SnapshotInfo, SnapshotMatch, SnapshotSelection, SnapshotStore};

/// File name of the record store inside the data directory.
pub const STORE_FILE_NAME: &str = "repos.json";
/// File name of the companion metadata object.
pub const METADATA_FILE_NAME: &str = "metadata.json";
/// Directory (inside the data directory) holding dated snapshots.
pub const HISTORY_DIR_NAME: &str = "historical";

/// Outcome of a successful [`RecordStore::save`].
#[derive(Debug, Clone, Serialize)]
pub struct SaveResult {
    pub path: PathBuf,
    pub repo_count: usize,
    /// Hex SHA-256 of the bytes written.
    pub sha256: String,
}

/// Handle on a record store file and its companion metadata.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    /// A store at an explicit path. The metadata file sits next to it.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The conventional `<data_dir>/repos.json` store.
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(STORE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn metadata_path(&self) -> PathBuf {
        self.path.with_file_name(METADATA_FILE_NAME)
    }

    /// Read and parse the store as raw JSON, without any schema checks.
    pub fn load_document(&self) -> Result<Value> {
        read_json(&self.path)
    }

    /// Read the store and decode every entry into a typed [`Record`].
    ///
    /// Fails on the first entry that cannot be decoded; nothing is returned
    /// partially.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn load_records(&self) -> Result<Vec<Record>> {
        let document = self.load_document()?;
        let records = decode_records(&document)?;
        debug!(count = records.len(), "records loaded");
        Ok(records)
    }

    /// Rewrite the store atomically, then refresh `metadata.json`.
    #[instrument(skip_all, fields(path = %self.path.display(), records = records.len()))]
    pub fn save(&self, records: &[Record]) -> Result<SaveResult> {
        let json = to_pretty_json(records)?;
        write_atomic(&self.path, json.as_bytes())?;

        let sha256 = hex_digest(json.as_bytes());
        let metadata = CollectionMetadata {
            collected_at: Utc::now().to_rfc3339(),
            repo_count: records.len(),
            sha256: Some(sha256.clone()),
        };
        let metadata_json = to_pretty_json(&metadata)?;
        write_atomic(&self.metadata_path(), metadata_json.as_bytes())?;

        info!(repo_count = records.len(), sha256 = %sha256, "record store saved");

        Ok(SaveResult {
            path: self.path.clone(),
            repo_count: records.len(),
            sha256,
        })
    }

    /// Read the companion metadata, if one has been written.
    pub fn load_metadata(&self) -> Result<Option<CollectionMetadata>> {
        let path = self.metadata_path();
        if !path.exists() {
            return Ok(None);
        }
        let value = read_json(&path)?;
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| FoldscapeError::parse(format!("{}: {e}", path.display())))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Decode every entry of a store or snapshot document.
fn decode_records(document: &Value) -> Result<Vec<Record>> {
    document_records(document)?
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value(entry.clone())
                .map_err(|e| FoldscapeError::parse(format!("record {index}: {e}")))
        })
        .collect()
}

pub(crate) fn read_json(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| FoldscapeError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| FoldscapeError::parse(format!("{}: {e}", path.display())))
}

pub(crate) fn to_pretty_json<T: Serialize + ?Sized>(data: &T) -> Result<String> {
    serde_json::to_string_pretty(data)
        .map_err(|e| FoldscapeError::validation(format!("JSON serialization failed: {e}")))
}

/// Write `bytes` to `.<name>.tmp` next to `target`, then rename over it.
pub(crate) fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| FoldscapeError::io(&parent, e))?;

    let file_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| FoldscapeError::config(format!("not a file path: {}", target.display())))?;
    let temp = parent.join(format!(".{file_name}.tmp"));

    std::fs::write(&temp, bytes).map_err(|e| FoldscapeError::io(&temp, e))?;
    if let Err(e) = std::fs::rename(&temp, target) {
        let _ = std::fs::remove_file(&temp);
        return Err(FoldscapeError::io(target, e));
    }

    debug!(path = %target.display(), size = bytes.len(), "wrote file");
    Ok(())
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
