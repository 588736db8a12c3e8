//! Point-in-region annotation.
//!
//! Segments are indexed per subject as start-sorted arrays, so each lookup is a
//! hash probe plus a binary search. Events are streamed through the index and
//! never joined against segments wholesale.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::interval::{CanonicalSegment, Instant};
use crate::partition::SegmentationError;
use crate::types::{EMPTY_LABELS, LabelSet, SubjectId};

/// An event that can be placed on a subject's time axis.
///
/// This trait allows annotation to work with different event representations
/// (e.g., [`PointEvent`], or JSON records carrying arbitrary extra fields).
pub trait TimedEvent<T> {
    /// Returns the subject the event belongs to.
    fn subject(&self) -> &str;

    /// Returns when the event happened.
    fn timestamp(&self) -> T;
}

/// A bare point observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointEvent<T> {
    pub subject: SubjectId,
    pub timestamp: T,
}

impl<T: Copy> TimedEvent<T> for PointEvent<T> {
    fn subject(&self) -> &str {
        self.subject.as_str()
    }

    fn timestamp(&self) -> T {
        self.timestamp
    }
}

/// An event joined with the labels of its containing segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedEvent<'a, E> {
    pub event: E,
    /// Empty when no segment contains the event.
    pub labels: &'a LabelSet,
}

#[derive(Debug, Clone)]
struct IndexedSpan<T> {
    start: T,
    end: T,
    labels: LabelSet,
}

/// Per-subject lookup structure over a segmentation.
#[derive(Debug, Clone)]
pub struct SegmentIndex<T> {
    by_subject: HashMap<SubjectId, Vec<IndexedSpan<T>>>,
    segment_count: usize,
}

impl<T: Instant> SegmentIndex<T> {
    /// Builds the index.
    ///
    /// Segments may arrive in any order but must not overlap within a subject;
    /// overlapping input is an upstream defect and is refused.
    pub fn new<I>(segments: I) -> Result<Self, SegmentationError>
    where
        I: IntoIterator<Item = CanonicalSegment<T>>,
    {
        let mut by_subject: HashMap<SubjectId, Vec<IndexedSpan<T>>> = HashMap::new();
        let mut segment_count = 0;
        for segment in segments {
            segment_count += 1;
            by_subject
                .entry(segment.subject)
                .or_default()
                .push(IndexedSpan {
                    start: segment.start,
                    end: segment.end,
                    labels: segment.labels,
                });
        }

        for (subject, spans) in &mut by_subject {
            spans.sort_by_key(|span| span.start);
            for pair in spans.windows(2) {
                if pair[1].start < pair[0].end {
                    return Err(SegmentationError::Overlap {
                        subject: subject.to_string(),
                        at: pair[1].start.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            by_subject,
            segment_count,
        })
    }

    pub fn subject_count(&self) -> usize {
        self.by_subject.len()
    }

    pub fn segment_count(&self) -> usize {
        self.segment_count
    }

    /// Returns the labels of the segment containing `at`, under `start <= at < end`.
    pub fn lookup(&self, subject: &str, at: T) -> &LabelSet {
        let Some(spans) = self.by_subject.get(subject) else {
            return &EMPTY_LABELS;
        };
        let idx = spans.partition_point(|span| span.start <= at);
        match idx.checked_sub(1).map(|i| &spans[i]) {
            Some(span) if at < span.end => &span.labels,
            _ => &EMPTY_LABELS,
        }
    }

    /// Annotates a stream of events, preserving order and dropping none.
    pub fn annotate<'a, E, I>(&'a self, events: I) -> impl Iterator<Item = AnnotatedEvent<'a, E>>
    where
        E: TimedEvent<T> + 'a,
        I: IntoIterator<Item = E>,
        I::IntoIter: 'a,
    {
        events.into_iter().map(move |event| {
            let labels = self.lookup(event.subject(), event.timestamp());
            AnnotatedEvent { event, labels }
        })
    }

    /// Looks up a batch of events in parallel; result `i` belongs to `events[i]`.
    pub fn lookup_all<E>(&self, events: &[E]) -> Vec<&LabelSet>
    where
        E: TimedEvent<T> + Sync,
    {
        events
            .par_iter()
            .map(|event| self.lookup(event.subject(), event.timestamp()))
            .collect()
    }
}
