//! Core temporal region algebra for hospital exclusion zones.
//!
//! This crate contains the fundamental types and logic for:
//! - Normalization: turning raw admission records into validated intervals
//! - Partitioning: merging overlapping labeled intervals into maximal segments
//! - Expansion: deriving buffer windows around qualifying stays
//! - Annotation: tagging point events with the labels of their containing segment

mod annotate;
pub mod config;
mod expand;
pub mod interval;
pub mod normalize;
mod partition;
pub mod pipeline;
pub mod predicate;
mod qualify;
pub mod types;

pub use annotate::{AnnotatedEvent, PointEvent, SegmentIndex, TimedEvent};
pub use config::{BufferSpec, RegionConfig, RegionSettings};
pub use expand::{expand_all, expand_segment};
pub use interval::{CanonicalSegment, Instant, LabeledSpan, RawInterval};
pub use normalize::{
    EpisodeNormalizer, ExclusionRule, RawEpisode, RejectReason, RejectedRecord, RuleField,
};
pub use partition::{SegmentationError, partition, partition_subject, verify_segmentation};
pub use pipeline::{
    EngineError, PipelineStats, Segmentation, build_daily_segmentation, build_segmentation,
};
pub use predicate::{Cohort, RegionPredicate, predicate_table};
pub use qualify::{filter_qualifying, qualifies};
pub use types::{LabelSet, RegionLabel, SubjectId, ValidationError};
