//! End-to-end catalog run: load → gate → categorize → velocity → gate → persist.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{Span, field, info, instrument, warn};

use serde_json::Value;

use foldscape_shared::{
    AppConfig, CategoryRules, Record, Result, RunId, VelocityConfig, document_records,
};
use foldscape_storage::{RecordStore, SaveResult, SnapshotSelection, SnapshotStore};

use crate::categorize::{CategorizeReport, categorize, clear_unknown_categories};
use crate::validate::{
    StructuralError, ValidationReport, validate_document, validate_records,
};
use crate::velocity::{
    Horizon, VelocityOptions, VelocityOutcome, VelocityReport, apply_history,
};

/// Which mutating stages a run executes. Validation always runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stages {
    pub categorize: bool,
    pub velocity: bool,
}

impl Stages {
    pub fn all() -> Self {
        Self {
            categorize: true,
            velocity: true,
        }
    }

    pub fn categorize_only() -> Self {
        Self {
            categorize: true,
            velocity: false,
        }
    }

    pub fn velocity_only() -> Self {
        Self {
            categorize: false,
            velocity: true,
        }
    }
}

impl Default for Stages {
    fn default() -> Self {
        Self::all()
    }
}

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding `repos.json` and `historical/`.
    pub data_dir: PathBuf,
    pub rules: CategoryRules,
    pub velocity: VelocityConfig,
    pub stages: Stages,
    /// Reference date for snapshot selection.
    pub today: NaiveDate,
    /// Run every stage but never write the store.
    pub dry_run: bool,
}

impl PipelineConfig {
    /// Build a run configuration from the loaded app config.
    pub fn from_app_config(config: &AppConfig, today: NaiveDate) -> Self {
        Self {
            data_dir: PathBuf::from(&config.paths.data_dir),
            rules: config.categories.clone(),
            velocity: config.velocity.clone(),
            stages: Stages::all(),
            today,
            dry_run: false,
        }
    }
}

/// What happened to one velocity horizon.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VelocityStage {
    Computed {
        selection: SnapshotSelection,
        report: VelocityReport,
    },
    /// No snapshot existed; tracking fields were left as loaded.
    InsufficientHistory { horizon: Horizon },
}

/// Result of a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: RunId,
    /// Records whose unknown category label was dropped before the input
    /// gate because the categorize stage was about to reassign it.
    pub cleared_categories: Vec<String>,
    /// `None` when the stage was not requested or the run stopped early.
    pub categorize: Option<CategorizeReport>,
    /// One entry per horizon attempted, short horizon first.
    pub velocity: Vec<VelocityStage>,
    /// The report of the gate that decided the run: the pre-flight check if
    /// it failed, otherwise the final check.
    pub validation: ValidationReport,
    /// True when the input failed validation and no stage ran.
    pub stopped_before_stages: bool,
    pub dry_run: bool,
    /// Set iff the store was rewritten.
    pub saved: Option<SaveResult>,
    pub elapsed: Duration,
}

impl PipelineReport {
    /// Final gate passed and, unless this was a dry run, the store was written.
    pub fn succeeded(&self) -> bool {
        self.validation.is_valid() && (self.dry_run || self.saved.is_some())
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a requested stage could not run.
    fn stage_skipped(&self, stage: &str, reason: &str);
    /// Called when the pipeline completes.
    fn done(&self, report: &PipelineReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn stage_skipped(&self, _stage: &str, _reason: &str) {}
    fn done(&self, _report: &PipelineReport) {}
}

/// Run the pipeline over `<data_dir>/repos.json`.
///
/// 1. Load the store document (I/O and JSON errors are fatal)
/// 2. Pre-flight validation; an invalid input stops the run untouched.
///    Unknown category labels are cleared first when categorizing.
/// 3. Decode into typed records
/// 4. Categorize
/// 5. Velocity for the short horizon, and the long one if configured
/// 6. Final validation
/// 7. Persist atomically unless this is a dry run or the gate failed
#[instrument(skip_all, fields(
    run_id = field::Empty,
    data_dir = %config.data_dir.display(),
    dry_run = config.dry_run,
))]
pub fn run_pipeline(
    config: &PipelineConfig,
    progress: &dyn ProgressReporter,
) -> Result<PipelineReport> {
    let start = Instant::now();
    let run_id = RunId::new();
    Span::current().record("run_id", field::display(&run_id));

    info!(%run_id, "starting pipeline");

    // --- Phase 1: Load ---
    progress.phase("Loading records");
    let store = RecordStore::in_data_dir(&config.data_dir);
    let mut document = store.load_document()?;

    // --- Phase 2: Pre-flight gate ---
    progress.phase("Validating input");
    let cleared_categories = if config.stages.categorize {
        clear_unknown_categories(&mut document)
    } else {
        Vec::new()
    };

    let mut preflight = validate_document(&document)?;
    let decoded = if preflight.is_valid() {
        decode_entries(&document, &mut preflight.errors)?
    } else {
        None
    };
    drop(document);

    let Some(mut records) = decoded else {
        warn!(
            errors = preflight.errors.len(),
            "input failed validation, nothing processed"
        );
        let report = PipelineReport {
            run_id,
            cleared_categories,
            categorize: None,
            velocity: Vec::new(),
            validation: preflight,
            stopped_before_stages: true,
            dry_run: config.dry_run,
            saved: None,
            elapsed: start.elapsed(),
        };
        progress.done(&report);
        return Ok(report);
    };

    // --- Phase 3: Categorize ---
    let categorize_report = if config.stages.categorize {
        progress.phase("Categorizing");
        Some(categorize(&mut records, &config.rules))
    } else {
        None
    };

    // --- Phase 4: Velocity ---
    let mut velocity = Vec::new();
    if config.stages.velocity {
        let snapshots = SnapshotStore::in_data_dir(&config.data_dir);

        progress.phase("Computing star velocity");
        velocity.push(velocity_stage(
            &mut records,
            &snapshots,
            config,
            Horizon::Short,
            config.velocity.days_back,
            progress,
        )?);

        if config.velocity.compute_long_horizon {
            progress.phase("Computing long-horizon velocity");
            velocity.push(velocity_stage(
                &mut records,
                &snapshots,
                config,
                Horizon::Long,
                config.velocity.long_horizon_days,
                progress,
            )?);
        }
    }

    // --- Phase 5: Final gate ---
    progress.phase("Validating output");
    let validation = validate_records(&records)?;

    // --- Phase 6: Persist ---
    let saved = if !validation.is_valid() {
        warn!(
            errors = validation.errors.len(),
            "output failed validation, store not written"
        );
        None
    } else if config.dry_run {
        info!("dry run, store not written");
        None
    } else {
        progress.phase("Saving");
        Some(store.save(&records)?)
    };

    let report = PipelineReport {
        run_id,
        cleared_categories,
        categorize: categorize_report,
        velocity,
        validation,
        stopped_before_stages: false,
        dry_run: config.dry_run,
        saved,
        elapsed: start.elapsed(),
    };

    info!(
        records = report.validation.record_count,
        published = report.saved.is_some(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "pipeline complete"
    );

    progress.done(&report);
    Ok(report)
}

/// Decode every entry, turning any entry the typed model rejects into a
/// structural error. `None` if at least one entry failed.
fn decode_entries(
    document: &Value,
    errors: &mut Vec<StructuralError>,
) -> Result<Option<Vec<Record>>> {
    let entries = document_records(document)?;
    let mut records = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<Record>(entry.clone()) {
            Ok(record) => records.push(record),
            Err(e) => {
                let fallback_id = format!("repo_index_{index}");
                let repo_id = entry
                    .get("repo_id")
                    .and_then(Value::as_str)
                    .unwrap_or(fallback_id.as_str());
                errors.push(StructuralError::new(
                    repo_id,
                    "record",
                    format!("cannot be decoded: {e}"),
                ));
            }
        }
    }

    Ok(errors.is_empty().then_some(records))
}

/// Select a snapshot for one horizon and apply it.
fn velocity_stage(
    records: &mut [Record],
    snapshots: &SnapshotStore,
    config: &PipelineConfig,
    horizon: Horizon,
    days_back: u32,
    progress: &dyn ProgressReporter,
) -> Result<VelocityStage> {
    let options = VelocityOptions {
        horizon,
        trending_threshold: config.velocity.trending_threshold,
    };

    let selection = snapshots.select(config.today, days_back)?;
    let samples = match &selection {
        Some(selection) => Some(snapshots.load_samples(&selection.snapshot)?),
        None => None,
    };

    match (apply_history(records, samples.as_deref(), &options), selection) {
        (VelocityOutcome::Computed(report), Some(selection)) => {
            Ok(VelocityStage::Computed { selection, report })
        }
        _ => {
            progress.stage_skipped(horizon.field(), "no historical snapshot");
            Ok(VelocityStage::InsufficientHistory { horizon })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
