//! End-to-end segmentation: merge stays, gate on duration, expand, re-partition.
//!
//! ```text
//! intervals -> partition (stays) -> [round to days] -> minimum-stay filter
//!           -> buffer expansion -> partition (final segments) -> verify
//! ```

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;

use crate::config::RegionConfig;
use crate::expand::expand_all;
use crate::interval::{CanonicalSegment, Instant, RawInterval};
use crate::normalize::round_to_day;
use crate::partition::{SegmentationError, partition, verify_segmentation};
use crate::qualify::filter_qualifying;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The final segmentation violated a partition invariant.
    #[error("segmentation invariant violated: {0}")]
    Invariant(#[from] SegmentationError),
}

/// Row counts at each stage of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub input_intervals: usize,
    /// Merged stays after the first partitioning pass.
    pub stays: usize,
    pub qualifying_stays: usize,
    pub expanded_regions: usize,
    pub segments: usize,
    pub subjects: usize,
}

/// The final segmentation of a run.
#[derive(Debug, Clone)]
pub struct Segmentation<T> {
    pub segments: Vec<CanonicalSegment<T>>,
    pub stats: PipelineStats,
}

/// Runs both partitioning passes at the granularity of the input.
pub fn build_segmentation<T: Instant>(
    intervals: &[RawInterval<T>],
    config: &RegionConfig,
) -> Result<Segmentation<T>, EngineError> {
    let stays = partition(intervals);
    segment_stays(intervals.len(), stays, config)
}

/// Runs the first pass on date-times, then finishes at day granularity.
///
/// Merged stays are rounded to the nearest calendar day before the duration
/// gate, so a stay admitted at 00:00 and discharged at 23:59:59 two days later
/// counts as three full days.
pub fn build_daily_segmentation(
    intervals: &[RawInterval<NaiveDateTime>],
    config: &RegionConfig,
) -> Result<Segmentation<NaiveDate>, EngineError> {
    let stays = partition(intervals)
        .into_iter()
        .map(|stay| CanonicalSegment {
            subject: stay.subject,
            start: round_to_day(stay.start),
            end: round_to_day(stay.end),
            labels: stay.labels,
        })
        .collect();
    segment_stays(intervals.len(), stays, config)
}

fn segment_stays<T: Instant>(
    input_intervals: usize,
    stays: Vec<CanonicalSegment<T>>,
    config: &RegionConfig,
) -> Result<Segmentation<T>, EngineError> {
    let stay_count = stays.len();
    tracing::debug!(input_intervals, stays = stay_count, "merged stays");

    let qualifying = filter_qualifying(stays, config.minimum_stay);
    tracing::debug!(
        qualifying = qualifying.len(),
        dropped = stay_count - qualifying.len(),
        "applied minimum stay"
    );

    let regions = expand_all(&qualifying, &config.buffers);
    tracing::debug!(regions = regions.len(), "expanded buffers");

    let segments = partition(&regions);
    verify_segmentation(&segments)?;

    let subjects = segments
        .windows(2)
        .filter(|pair| pair[0].subject != pair[1].subject)
        .count()
        + usize::from(!segments.is_empty());

    let stats = PipelineStats {
        input_intervals,
        stays: stay_count,
        qualifying_stays: qualifying.len(),
        expanded_regions: regions.len(),
        segments: segments.len(),
        subjects,
    };
    tracing::debug!(segments = stats.segments, subjects, "final segmentation");

    Ok(Segmentation { segments, stats })
}
