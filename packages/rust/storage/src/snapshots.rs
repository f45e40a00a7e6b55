//! Dated historical snapshots (`historical/YYYY-MM-DD.json`).

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{Days, NaiveDate};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use foldscape_shared::{FoldscapeError, Record, Result, StarSample, document_records};

use crate::{HISTORY_DIR_NAME, read_json, to_pretty_json, write_atomic};

static SNAPSHOT_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})\.json$").expect("valid regex"));

/// One snapshot file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotInfo {
    pub date: NaiveDate,
    pub path: PathBuf,
}

/// How a snapshot was chosen for a requested date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotMatch {
    /// The snapshot is dated exactly on the requested day.
    Exact,
    /// Nothing existed for `requested`; the oldest snapshot was used instead.
    Fallback { requested: NaiveDate },
}

/// A selected snapshot and how it was matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotSelection {
    pub snapshot: SnapshotInfo,
    pub matched: SnapshotMatch,
}

impl SnapshotSelection {
    pub fn is_fallback(&self) -> bool {
        matches!(self.matched, SnapshotMatch::Fallback { .. })
    }
}

/// Handle on the snapshot directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The conventional `<data_dir>/historical` directory.
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(HISTORY_DIR_NAME))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All snapshots, oldest first. A missing directory has none.
    pub fn list(&self) -> Result<Vec<SnapshotInfo>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.dir).map_err(|e| FoldscapeError::io(&self.dir, e))?;
        let mut snapshots = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| FoldscapeError::io(&self.dir, e))?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(caps) = SNAPSHOT_FILE_RE.captures(name) else {
                continue;
            };
            // Matches the shape but not the calendar, e.g. 2025-02-30.
            let Ok(date) = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d") else {
                debug!(file = name, "ignoring snapshot with impossible date");
                continue;
            };
            snapshots.push(SnapshotInfo {
                date,
                path: entry.path(),
            });
        }

        snapshots.sort_by_key(|s| s.date);
        Ok(snapshots)
    }

    /// Pick the snapshot dated `days_back` days before `today`, falling back
    /// to the oldest one. `None` when there are no snapshots at all.
    #[instrument(skip_all, fields(dir = %self.dir.display(), %today, days_back))]
    pub fn select(&self, today: NaiveDate, days_back: u32) -> Result<Option<SnapshotSelection>> {
        let requested = today
            .checked_sub_days(Days::new(u64::from(days_back)))
            .ok_or_else(|| FoldscapeError::config(format!("days_back {days_back} out of range")))?;

        let mut snapshots = self.list()?;
        if let Some(pos) = snapshots.iter().position(|s| s.date == requested) {
            let snapshot = snapshots.swap_remove(pos);
            debug!(date = %snapshot.date, "exact snapshot found");
            return Ok(Some(SnapshotSelection {
                snapshot,
                matched: SnapshotMatch::Exact,
            }));
        }

        if snapshots.is_empty() {
            return Ok(None);
        }
        let oldest = snapshots.swap_remove(0);
        warn!(
            %requested,
            using = %oldest.date,
            "no snapshot for requested date, falling back to oldest"
        );
        Ok(Some(SnapshotSelection {
            snapshot: oldest,
            matched: SnapshotMatch::Fallback { requested },
        }))
    }

    /// Star counts recorded in a snapshot. Entries without a string
    /// `repo_id` are dropped.
    pub fn load_samples(&self, snapshot: &SnapshotInfo) -> Result<Vec<StarSample>> {
        let document = read_json(&snapshot.path)?;
        let samples: Vec<StarSample> = document_records(&document)?
            .into_iter()
            .filter_map(StarSample::from_value)
            .collect();
        debug!(date = %snapshot.date, samples = samples.len(), "snapshot loaded");
        Ok(samples)
    }

    /// Write `records` as the snapshot for `date`, replacing any existing one.
    pub fn save(&self, date: NaiveDate, records: &[Record]) -> Result<SnapshotInfo> {
        let path = self.dir.join(format!("{}.json", date.format("%Y-%m-%d")));
        let json = to_pretty_json(records)?;
        write_atomic(&path, json.as_bytes())?;
        debug!(%date, records = records.len(), "snapshot saved");
        Ok(SnapshotInfo { date, path })
    }
}
