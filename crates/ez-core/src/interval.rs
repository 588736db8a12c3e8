//! Labeled intervals on a time axis.
//!
//! Every interval is half-open, `[start, end)`. The instant type is generic so the
//! same algebra runs over date-times (raw admissions) and calendar dates (the
//! rounded, buffer-expanded segmentation).

use std::fmt;
use std::ops::{Add, Sub};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::types::{LabelSet, RegionLabel, SubjectId, ValidationError};

/// A point on the time axis that supports calendar arithmetic.
///
/// Implemented for `chrono::NaiveDate` and `chrono::NaiveDateTime` (and anything
/// else with the same arithmetic).
pub trait Instant:
    Copy
    + Ord
    + Send
    + Sync
    + fmt::Debug
    + fmt::Display
    + Add<TimeDelta, Output = Self>
    + Sub<TimeDelta, Output = Self>
    + Sub<Self, Output = TimeDelta>
{
}

impl<T> Instant for T where
    T: Copy
        + Ord
        + Send
        + Sync
        + fmt::Debug
        + fmt::Display
        + Add<TimeDelta, Output = T>
        + Sub<TimeDelta, Output = T>
        + Sub<T, Output = TimeDelta>
{
}

/// An interval that can take part in partitioning.
///
/// This trait lets the partitioner work with raw single-label intervals and with
/// already-canonical segments alike, so a segmentation can be fed back in.
pub trait LabeledSpan<T> {
    /// Returns the subject the interval belongs to.
    fn subject(&self) -> &SubjectId;

    /// Returns the inclusive start.
    fn start(&self) -> T;

    /// Returns the exclusive end.
    fn end(&self) -> T;

    /// Returns every label the interval contributes.
    fn labels(&self) -> impl Iterator<Item = &RegionLabel>;
}

/// A single-label interval as produced by normalization or expansion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawInterval<T> {
    pub subject: SubjectId,
    pub start: T,
    pub end: T,
    pub label: RegionLabel,
}

impl<T: Instant> RawInterval<T> {
    /// Creates an interval, rejecting one that ends before it starts.
    ///
    /// Zero-length intervals are accepted; they cover nothing.
    pub fn new(
        subject: SubjectId,
        start: T,
        end: T,
        label: RegionLabel,
    ) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvertedInterval {
                subject: subject.to_string(),
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self {
            subject,
            start,
            end,
            label,
        })
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }
}

impl<T: Copy> LabeledSpan<T> for RawInterval<T> {
    fn subject(&self) -> &SubjectId {
        &self.subject
    }

    fn start(&self) -> T {
        self.start
    }

    fn end(&self) -> T {
        self.end
    }

    fn labels(&self) -> impl Iterator<Item = &RegionLabel> {
        std::iter::once(&self.label)
    }
}

/// A maximal, label-homogeneous piece of a subject's segmentation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalSegment<T> {
    pub subject: SubjectId,
    pub start: T,
    pub end: T,
    pub labels: LabelSet,
}

impl<T: Instant> CanonicalSegment<T> {
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Returns true if `t` lies in `[start, end)`.
    pub fn contains(&self, t: T) -> bool {
        self.start <= t && t < self.end
    }
}

impl<T: Copy> LabeledSpan<T> for CanonicalSegment<T> {
    fn subject(&self) -> &SubjectId {
        &self.subject
    }

    fn start(&self) -> T {
        self.start
    }

    fn end(&self) -> T {
        self.end
    }

    fn labels(&self) -> impl Iterator<Item = &RegionLabel> {
        self.labels.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + TimeDelta::days(offset)
    }

    #[test]
    fn raw_interval_rejects_inverted_bounds() {
        let subject = SubjectId::new("P1").unwrap();
        let err = RawInterval::new(subject, day(5), day(1), RegionLabel::CORE).unwrap_err();
        assert_eq!(
            err.to_string(),
            "interval for subject P1 ends before it starts (2024-01-06 > 2024-01-02)"
        );
    }

    #[test]
    fn raw_interval_accepts_zero_length() {
        let subject = SubjectId::new("P1").unwrap();
        let interval = RawInterval::new(subject, day(3), day(3), RegionLabel::CORE).unwrap();
        assert_eq!(interval.duration(), TimeDelta::zero());
    }

    #[test]
    fn segment_containment_is_half_open() {
        let segment = CanonicalSegment {
            subject: SubjectId::new("P1").unwrap(),
            start: day(1),
            end: day(5),
            labels: LabelSet::single(RegionLabel::CORE),
        };
        assert!(!segment.contains(day(0)));
        assert!(segment.contains(day(1)));
        assert!(segment.contains(day(4)));
        assert!(!segment.contains(day(5)));
    }
}
