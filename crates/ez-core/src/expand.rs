//! Buffer expansion around qualifying admissions.
//!
//! ```text
//! ----| buffer before | pad |        CORE        | pad | buffer after |----
//! ```
//!
//! Each qualifying stay yields up to three single-label intervals. They overlap
//! freely with those of nearby stays; the second partitioning pass resolves that.

use crate::config::BufferSpec;
use crate::interval::{CanonicalSegment, Instant, RawInterval};
use crate::types::RegionLabel;

/// Derives the buffer-before, core and buffer-after intervals for one stay.
///
/// Zero-width buffers are omitted. The core interval is labeled
/// [`RegionLabel::CORE`] whatever labels the stay carried.
pub fn expand_segment<T: Instant>(
    segment: &CanonicalSegment<T>,
    buffers: &BufferSpec,
) -> Vec<RawInterval<T>> {
    let mut regions = Vec::with_capacity(3);

    if buffers.buffer_before > chrono::TimeDelta::zero() {
        let end = segment.start - buffers.padding_before;
        regions.push(RawInterval {
            subject: segment.subject.clone(),
            start: end - buffers.buffer_before,
            end,
            label: RegionLabel::BUFFER_BEFORE,
        });
    }

    regions.push(RawInterval {
        subject: segment.subject.clone(),
        start: segment.start,
        end: segment.end,
        label: RegionLabel::CORE,
    });

    if buffers.buffer_after > chrono::TimeDelta::zero() {
        let start = segment.end + buffers.padding_after;
        regions.push(RawInterval {
            subject: segment.subject.clone(),
            start,
            end: start + buffers.buffer_after,
            label: RegionLabel::BUFFER_AFTER,
        });
    }

    regions
}

/// Expands every stay; output order follows input order.
pub fn expand_all<T: Instant>(
    segments: &[CanonicalSegment<T>],
    buffers: &BufferSpec,
) -> Vec<RawInterval<T>> {
    segments
        .iter()
        .flat_map(|segment| expand_segment(segment, buffers))
        .collect()
}
