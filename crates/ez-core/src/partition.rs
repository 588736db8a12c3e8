//! Interval partitioning.
//!
//! Turns an arbitrary multiset of labeled intervals into the maximal, non-overlapping
//! segmentation of each subject's time axis.
//!
//! # Algorithm Summary
//!
//! 1. Collect the distinct start/end boundaries of a subject's intervals
//! 2. Consecutive boundaries form elementary cells `[b_i, b_{i+1})`
//! 3. A cell carries the union of labels of every interval containing it; cells
//!    covered by nothing are gaps and are dropped
//! 4. Neighbouring cells that touch and carry the same label set coalesce into one run
//!
//! Steps 2-4 are done in a single sweep over the boundaries, keeping a count of
//! open intervals per label. Because every interval endpoint is a boundary, a cell
//! is always either fully inside or fully outside each interval, so the open-label
//! counts at a cell are exactly the containment relation.

use std::collections::BTreeMap;

use rayon::prelude::*;
use thiserror::Error;

use crate::interval::{CanonicalSegment, Instant, LabeledSpan};
use crate::types::{LabelSet, RegionLabel, SubjectId};

/// A broken segmentation invariant.
///
/// These never stem from bad input data; they mean the partitioner itself is wrong.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SegmentationError {
    #[error("segment for subject {subject} has an empty or inverted span ({start} .. {end})")]
    EmptySpan {
        subject: String,
        start: String,
        end: String,
    },

    #[error("segment for subject {subject} starting at {start} has no labels")]
    EmptyLabels { subject: String, start: String },

    #[error("segments are not grouped by subject ({previous} before {next})")]
    SubjectOrder { previous: String, next: String },

    #[error("segments for subject {subject} overlap or are unsorted at {at}")]
    Overlap { subject: String, at: String },

    #[error("adjacent segments for subject {subject} at {at} share labels {labels}")]
    NotMaximal {
        subject: String,
        at: String,
        labels: String,
    },
}

/// Partitions intervals for every subject present in `spans`.
///
/// Subjects are processed in parallel; the output is sorted by subject, then start,
/// and does not depend on the order of `spans`.
pub fn partition<T, S>(spans: &[S]) -> Vec<CanonicalSegment<T>>
where
    T: Instant,
    S: LabeledSpan<T> + Sync,
{
    let mut by_subject: BTreeMap<&SubjectId, Vec<&S>> = BTreeMap::new();
    for span in spans {
        by_subject.entry(span.subject()).or_default().push(span);
    }

    let groups: Vec<(&SubjectId, Vec<&S>)> = by_subject.into_iter().collect();
    let per_subject: Vec<Vec<CanonicalSegment<T>>> = groups
        .par_iter()
        .map(|(subject, group)| partition_subject(subject, group))
        .collect();

    per_subject.into_iter().flatten().collect()
}

/// Partitions the intervals of a single subject.
///
/// All `spans` must belong to `subject`. Zero-length intervals contribute boundaries
/// but cover nothing, so they never produce or split a segment.
pub fn partition_subject<T, S>(subject: &SubjectId, spans: &[&S]) -> Vec<CanonicalSegment<T>>
where
    T: Instant,
    S: LabeledSpan<T>,
{
    // Label open/close events keyed by boundary. BTreeMap keeps boundaries sorted
    // and distinct.
    let mut boundaries: BTreeMap<T, Vec<(&RegionLabel, i64)>> = BTreeMap::new();
    for span in spans {
        debug_assert_eq!(span.subject(), subject, "span from another subject");
        let (start, end) = (span.start(), span.end());
        debug_assert!(start <= end, "inverted interval reached the partitioner");
        if start >= end {
            continue;
        }
        for label in span.labels() {
            boundaries.entry(start).or_default().push((label, 1));
            boundaries.entry(end).or_default().push((label, -1));
        }
    }

    let mut open: BTreeMap<&RegionLabel, i64> = BTreeMap::new();
    let mut segments: Vec<CanonicalSegment<T>> = Vec::new();
    let mut cursor = boundaries.into_iter().peekable();

    while let Some((at, changes)) = cursor.next() {
        for (label, delta) in changes {
            let remaining = {
                let count = open.entry(label).or_insert(0);
                *count += delta;
                *count
            };
            if remaining == 0 {
                open.remove(label);
            }
        }

        let Some(next) = cursor.peek().map(|(t, _)| *t) else {
            debug_assert!(open.is_empty(), "labels still open after the last boundary");
            break;
        };

        // Nothing covers [at, next): a true gap.
        if open.is_empty() {
            continue;
        }

        let labels: LabelSet = open.keys().map(|label| (*label).clone()).collect();
        match segments.last_mut() {
            Some(last) if last.end == at && last.labels == labels => last.end = next,
            _ => segments.push(CanonicalSegment {
                subject: subject.clone(),
                start: at,
                end: next,
                labels,
            }),
        }
    }

    segments
}

/// Checks the post-merge invariants of a segmentation.
///
/// Segments must be grouped by subject in ascending order, sorted by start within a
/// subject, non-empty, labeled, pairwise non-overlapping, and no two touching
/// segments may carry the same label set.
pub fn verify_segmentation<T: Instant>(
    segments: &[CanonicalSegment<T>],
) -> Result<(), SegmentationError> {
    for segment in segments {
        if segment.start >= segment.end {
            return Err(SegmentationError::EmptySpan {
                subject: segment.subject.to_string(),
                start: segment.start.to_string(),
                end: segment.end.to_string(),
            });
        }
        if segment.labels.is_empty() {
            return Err(SegmentationError::EmptyLabels {
                subject: segment.subject.to_string(),
                start: segment.start.to_string(),
            });
        }
    }

    for pair in segments.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if prev.subject != next.subject {
            if prev.subject > next.subject {
                return Err(SegmentationError::SubjectOrder {
                    previous: prev.subject.to_string(),
                    next: next.subject.to_string(),
                });
            }
            continue;
        }
        if next.start < prev.end {
            return Err(SegmentationError::Overlap {
                subject: next.subject.to_string(),
                at: next.start.to_string(),
            });
        }
        if next.start == prev.end && next.labels == prev.labels {
            return Err(SegmentationError::NotMaximal {
                subject: next.subject.to_string(),
                at: next.start.to_string(),
                labels: next.labels.to_string(),
            });
        }
    }

    Ok(())
}
