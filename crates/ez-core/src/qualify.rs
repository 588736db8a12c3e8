//! Minimum-stay gate applied before buffer expansion.

use chrono::TimeDelta;

use crate::interval::{CanonicalSegment, Instant};

/// Returns true if the stay lasts strictly longer than `minimum`.
pub fn qualifies<T: Instant>(segment: &CanonicalSegment<T>, minimum: TimeDelta) -> bool {
    segment.duration() > minimum
}

/// Keeps only stays long enough to be expanded.
///
/// Shorter stays are dropped entirely; they take no part in the exclusion zone.
pub fn filter_qualifying<T: Instant>(
    segments: Vec<CanonicalSegment<T>>,
    minimum: TimeDelta,
) -> Vec<CanonicalSegment<T>> {
    segments
        .into_iter()
        .filter(|segment| qualifies(segment, minimum))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LabelSet, RegionLabel, SubjectId};
    use chrono::NaiveDate;

    fn stay(days: i64) -> CanonicalSegment<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        CanonicalSegment {
            subject: SubjectId::new("P1").unwrap(),
            start,
            end: start + TimeDelta::days(days),
            labels: LabelSet::single(RegionLabel::CORE),
        }
    }

    #[test]
    fn threshold_is_exclusive() {
        let minimum = TimeDelta::days(2);
        assert!(!qualifies(&stay(1), minimum));
        assert!(!qualifies(&stay(2), minimum));
        assert!(qualifies(&stay(3), minimum));
    }

    #[test]
    fn filter_drops_short_stays() {
        let kept = filter_qualifying(vec![stay(1), stay(5), stay(2)], TimeDelta::days(2));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].duration(), TimeDelta::days(5));
    }

    #[test]
    fn zero_threshold_keeps_any_non_empty_stay() {
        let kept = filter_qualifying(vec![stay(1)], TimeDelta::zero());
        assert_eq!(kept.len(), 1);
    }
}
