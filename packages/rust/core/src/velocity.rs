//! Star velocity and trending detection.
//!
//! Velocity is the star gain of each current record against a historical
//! snapshot. A repo the snapshot does not know has velocity 0, so a newly
//! tracked repo never trends on its first run.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use foldscape_shared::{Record, StarSample};

/// Which tracking field a velocity pass writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    /// Writes `star_velocity_7d` and `trending`.
    Short,
    /// Writes `star_velocity_30d` only.
    Long,
}

impl Horizon {
    pub fn field(&self) -> &'static str {
        match self {
            Self::Short => "star_velocity_7d",
            Self::Long => "star_velocity_30d",
        }
    }
}

/// Parameters for one velocity pass.
#[derive(Debug, Clone)]
pub struct VelocityOptions {
    pub horizon: Horizon,
    /// Minimum star gain to flag a repo as trending.
    pub trending_threshold: i64,
}

impl Default for VelocityOptions {
    fn default() -> Self {
        Self {
            horizon: Horizon::Short,
            trending_threshold: 10,
        }
    }
}

/// A repo whose gain met the trending threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendingRepo {
    pub repo_id: String,
    pub name: String,
    pub velocity: i64,
}

/// Summary of one velocity pass.
#[derive(Debug, Clone, Serialize)]
pub struct VelocityReport {
    pub horizon: Horizon,
    /// Records whose tracking fields were written.
    pub updated: usize,
    /// Records the snapshot had no star count for (velocity forced to 0).
    pub absent_from_history: usize,
    /// Trending repos in record order. Always empty for [`Horizon::Long`].
    pub trending: Vec<TrendingRepo>,
}

/// Result of running the engine against whatever history exists.
#[derive(Debug, Clone)]
pub enum VelocityOutcome {
    Computed(VelocityReport),
    /// No snapshot at all; tracking fields were left as they were.
    InsufficientHistory,
}

/// Run a velocity pass if a snapshot is available.
pub fn apply_history(
    current: &mut [Record],
    history: Option<&[StarSample]>,
    options: &VelocityOptions,
) -> VelocityOutcome {
    match history {
        Some(samples) => VelocityOutcome::Computed(compute_velocity(current, samples, options)),
        None => {
            warn!(
                horizon = options.horizon.field(),
                "no historical snapshot, velocity not computed"
            );
            VelocityOutcome::InsufficientHistory
        }
    }
}

/// Compute velocity for every current record against `historical`.
#[instrument(skip_all, fields(
    horizon = options.horizon.field(),
    current = current.len(),
    historical = historical.len(),
))]
pub fn compute_velocity(
    current: &mut [Record],
    historical: &[StarSample],
    options: &VelocityOptions,
) -> VelocityReport {
    let baseline: HashMap<&str, i64> = historical
        .iter()
        .filter_map(|s| s.stars.map(|stars| (s.repo_id.as_str(), stars)))
        .collect();

    let mut report = VelocityReport {
        horizon: options.horizon,
        updated: 0,
        absent_from_history: 0,
        trending: Vec::new(),
    };

    for record in current.iter_mut() {
        let stars = i64::try_from(record.metadata.stars).unwrap_or(i64::MAX);
        let old = match baseline.get(record.repo_id.as_str()) {
            Some(old) => *old,
            None => {
                report.absent_from_history += 1;
                stars
            }
        };
        let velocity = stars.saturating_sub(old);

        match options.horizon {
            Horizon::Short => {
                let trending = velocity >= options.trending_threshold;
                record.tracking.star_velocity_7d = velocity;
                record.tracking.trending = trending;
                if trending {
                    debug!(repo_id = %record.repo_id, velocity, "trending");
                    report.trending.push(TrendingRepo {
                        repo_id: record.repo_id.clone(),
                        name: record.metadata.name.clone(),
                        velocity,
                    });
                }
            }
            Horizon::Long => record.tracking.star_velocity_30d = velocity,
        }
        report.updated += 1;
    }

    info!(
        updated = report.updated,
        trending = report.trending.len(),
        absent = report.absent_from_history,
        "velocity computed"
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use foldscape_shared::RepoMetadata;

    fn record(repo_id: &str, stars: u64) -> Record {
        let name = repo_id.rsplit('/').next().unwrap_or(repo_id);
        Record::new(
            repo_id,
            RepoMetadata::new(name, format!("https://github.com/{repo_id}"), stars),
            Utc::now(),
        )
    }

    fn sample(repo_id: &str, stars: Option<i64>) -> StarSample {
        StarSample {
            repo_id: repo_id.into(),
            stars,
        }
    }

    fn short(threshold: i64) -> VelocityOptions {
        VelocityOptions {
            horizon: Horizon::Short,
            trending_threshold: threshold,
        }
    }

    #[test]
    fn gain_over_threshold_trends() {
        let mut current = vec![record("a/b", 120)];
        let report = compute_velocity(&mut current, &[sample("a/b", Some(100))], &short(10));
        assert_eq!(current[0].tracking.star_velocity_7d, 20);
        assert!(current[0].tracking.trending);
        assert_eq!(report.trending.len(), 1);
        assert_eq!(report.trending[0].name, "b");
        assert_eq!(report.trending[0].velocity, 20);
    }

    #[test]
    fn absent_from_empty_history_is_zero() {
        let mut current = vec![record("c/d", 50)];
        let report = compute_velocity(&mut current, &[], &short(10));
        assert_eq!(current[0].tracking.star_velocity_7d, 0);
        assert!(!current[0].tracking.trending);
        assert_eq!(report.absent_from_history, 1);
    }

    #[test]
    fn unchanged_stars_never_trend_with_positive_threshold() {
        for threshold in [1, 10, 1000] {
            let mut current = vec![record("a/b", 77)];
            compute_velocity(&mut current, &[sample("a/b", Some(77))], &short(threshold));
            assert_eq!(current[0].tracking.star_velocity_7d, 0);
            assert!(!current[0].tracking.trending);
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        let mut current = vec![record("a/b", 110)];
        compute_velocity(&mut current, &[sample("a/b", Some(100))], &short(10));
        assert!(current[0].tracking.trending);
    }

    #[test]
    fn losses_are_negative() {
        let mut current = vec![record("a/b", 90)];
        compute_velocity(&mut current, &[sample("a/b", Some(100))], &short(10));
        assert_eq!(current[0].tracking.star_velocity_7d, -10);
        assert!(!current[0].tracking.trending);
    }

    #[test]
    fn missing_historical_stars_count_as_absent() {
        let mut current = vec![record("a/b", 40)];
        let report = compute_velocity(&mut current, &[sample("a/b", None)], &short(10));
        assert_eq!(current[0].tracking.star_velocity_7d, 0);
        assert_eq!(report.absent_from_history, 1);
    }

    #[test]
    fn long_horizon_leaves_trending_alone() {
        let mut current = vec![record("a/b", 500)];
        current[0].tracking.trending = true;
        current[0].tracking.star_velocity_7d = 12;
        let options = VelocityOptions {
            horizon: Horizon::Long,
            trending_threshold: 10,
        };
        let report = compute_velocity(&mut current, &[sample("a/b", Some(100))], &options);
        assert_eq!(current[0].tracking.star_velocity_30d, 400);
        assert_eq!(current[0].tracking.star_velocity_7d, 12);
        assert!(current[0].tracking.trending);
        assert!(report.trending.is_empty());
    }

    #[test]
    fn insufficient_history_leaves_tracking_untouched() {
        let mut current = vec![record("a/b", 500)];
        current[0].tracking.star_velocity_7d = 33;
        current[0].tracking.trending = true;
        let before = current[0].tracking.clone();

        let outcome = apply_history(&mut current, None, &short(10));
        assert!(matches!(outcome, VelocityOutcome::InsufficientHistory));
        assert_eq!(current[0].tracking, before);
    }

    #[test]
    fn apply_history_with_empty_snapshot_still_computes() {
        let mut current = vec![record("a/b", 500)];
        current[0].tracking.star_velocity_7d = 33;
        let empty: Vec<StarSample> = Vec::new();
        let outcome = apply_history(&mut current, Some(empty.as_slice()), &short(10));
        assert!(matches!(outcome, VelocityOutcome::Computed(_)));
        assert_eq!(current[0].tracking.star_velocity_7d, 0);
    }

    #[test]
    fn first_tracked_is_never_rewritten() {
        let mut current = vec![record("a/b", 120)];
        let stamp = current[0].tracking.first_tracked.clone();
        compute_velocity(&mut current, &[sample("a/b", Some(1))], &short(10));
        assert_eq!(current[0].tracking.first_tracked, stamp);
    }
}
