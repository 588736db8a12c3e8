//! Named predicates over label sets, and the reporting cohorts built on them.
//!
//! All predicates are pure. A reading with no containing segment has an empty
//! label set, which counts as outside every region.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::types::{LabelSet, RegionLabel};

/// Boolean predicates consumed by stratified reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegionPredicate {
    /// In an admission and in neither buffer.
    InCoreOnly,
    InCoreAny,
    InBufferBeforeOnly,
    InBufferBeforeAny,
    InBufferAfterOnly,
    InBufferAfterAny,
    /// In a buffer but not in an admission.
    InBuffersOnly,
    InBuffersAny,
    /// In an admission or either buffer.
    InExclusionZone,
    OutOfCore,
    OutOfExclusionZone,
    IsEmpty,
}

impl RegionPredicate {
    pub const ALL: [Self; 12] = [
        Self::InCoreOnly,
        Self::InCoreAny,
        Self::InBufferBeforeOnly,
        Self::InBufferBeforeAny,
        Self::InBufferAfterOnly,
        Self::InBufferAfterAny,
        Self::InBuffersOnly,
        Self::InBuffersAny,
        Self::InExclusionZone,
        Self::OutOfCore,
        Self::OutOfExclusionZone,
        Self::IsEmpty,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::InCoreOnly => "in_core_only",
            Self::InCoreAny => "in_core_any",
            Self::InBufferBeforeOnly => "in_buffer_before_only",
            Self::InBufferBeforeAny => "in_buffer_before_any",
            Self::InBufferAfterOnly => "in_buffer_after_only",
            Self::InBufferAfterAny => "in_buffer_after_any",
            Self::InBuffersOnly => "in_buffers_only",
            Self::InBuffersAny => "in_buffers_any",
            Self::InExclusionZone => "in_exclusion_zone",
            Self::OutOfCore => "out_of_core",
            Self::OutOfExclusionZone => "out_of_exclusion_zone",
            Self::IsEmpty => "is_empty",
        }
    }

    pub fn evaluate(self, labels: &LabelSet) -> bool {
        let core = labels.contains(&RegionLabel::CORE);
        let before = labels.contains(&RegionLabel::BUFFER_BEFORE);
        let after = labels.contains(&RegionLabel::BUFFER_AFTER);
        match self {
            Self::InCoreOnly => core && !before && !after,
            Self::InCoreAny => core,
            Self::InBufferBeforeOnly => before && !core && !after,
            Self::InBufferBeforeAny => before,
            Self::InBufferAfterOnly => after && !core && !before,
            Self::InBufferAfterAny => after,
            Self::InBuffersOnly => (before || after) && !core,
            Self::InBuffersAny => before || after,
            Self::InExclusionZone => core || before || after,
            Self::OutOfCore => !core,
            Self::OutOfExclusionZone => !(core || before || after),
            Self::IsEmpty => labels.is_empty(),
        }
    }
}

impl fmt::Display for RegionPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RegionPredicate {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|predicate| predicate.name() == s)
            .ok_or_else(|| UnknownName {
                kind: "predicate",
                name: s.to_string(),
            })
    }
}

/// Error type for unknown predicate or cohort names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownName {
    kind: &'static str,
    name: String,
}

impl fmt::Display for UnknownName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.name)
    }
}

impl std::error::Error for UnknownName {}

/// Reading populations used by stratified reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cohort {
    #[default]
    All,
    /// Readings inside the exclusion zone.
    InHospital,
    /// Readings outside the exclusion zone, including unmatched ones.
    OutHospital,
}

impl Cohort {
    pub const ALL: [Self; 3] = [Self::InHospital, Self::OutHospital, Self::All];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::InHospital => "in_hospital",
            Self::OutHospital => "out_hospital",
        }
    }

    pub fn includes(self, labels: &LabelSet) -> bool {
        match self {
            Self::All => true,
            Self::InHospital => RegionPredicate::InExclusionZone.evaluate(labels),
            Self::OutHospital => RegionPredicate::OutOfExclusionZone.evaluate(labels),
        }
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Cohort {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|cohort| cohort.name() == normalized)
            .ok_or_else(|| UnknownName {
                kind: "cohort",
                name: s.to_string(),
            })
    }
}

/// One row of the predicate truth table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredicateRow {
    pub labels: LabelSet,
    pub predicates: BTreeMap<&'static str, bool>,
}

/// Evaluates every predicate against every subset of the well-known labels.
///
/// Rows are ordered by subset size, then lexicographically, starting with the
/// empty set. Downstream joins can use this as a lookup table keyed by label set.
pub fn predicate_table() -> Vec<PredicateRow> {
    let labels = RegionLabel::WELL_KNOWN;
    let mut subsets: Vec<Vec<RegionLabel>> = (0u8..1 << labels.len())
        .map(|mask| {
            labels
                .iter()
                .enumerate()
                .filter(|(bit, _)| mask & (1 << bit) != 0)
                .map(|(_, label)| label.clone())
                .collect()
        })
        .collect();
    subsets.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

    subsets
        .into_iter()
        .map(|subset| {
            let labels: LabelSet = subset.into_iter().collect();
            let predicates = RegionPredicate::ALL
                .into_iter()
                .map(|predicate| (predicate.name(), predicate.evaluate(&labels)))
                .collect();
            PredicateRow { labels, predicates }
        })
        .collect()
}
