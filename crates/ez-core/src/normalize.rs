//! Episode normalization.
//!
//! Canonicalizes raw admission records into validated single-label intervals.
//! Records that cannot be canonicalized are rejected with a reason rather than
//! dropped, and processing carries on with the rest.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::interval::RawInterval;
use crate::types::{RegionLabel, SubjectId, ValidationError};

/// A raw admission record as delivered by upstream ingestion.
///
/// Every field is optional here so that incomplete records can be reported
/// instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEpisode {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub admitted: Option<String>,
    #[serde(default)]
    pub discharged: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

/// The record field an exclusion rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleField {
    Subject,
    Label,
}

/// A declarative, externally configured exclusion rule.
///
/// A record is excluded if the inspected field equals any of `equals`, or matches
/// the `matches` regular expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionRule {
    pub name: String,
    pub field: RuleField,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub equals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<String>,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    name: String,
    field: RuleField,
    equals: HashSet<String>,
    pattern: Option<Regex>,
}

impl CompiledRule {
    fn excludes(&self, value: &str) -> bool {
        self.equals.contains(value) || self.pattern.as_ref().is_some_and(|re| re.is_match(value))
    }
}

/// Why a record was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("missing {field}")]
    MissingField { field: &'static str },

    #[error("unparseable {field}: {value}")]
    UnparseableDate { field: &'static str, value: String },

    #[error("discharge {end} precedes admission {start}")]
    Inverted { start: String, end: String },

    #[error("excluded by rule {rule}")]
    Excluded { rule: String },

    #[error("malformed record: {message}")]
    Malformed { message: String },
}

/// A record that did not make it into the interval set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    /// Caller-defined position of the record (e.g. its input line).
    pub record: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub reason: RejectReason,
}

/// Result of normalizing a batch of records.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    /// Distinct valid intervals in first-seen order.
    pub intervals: Vec<RawInterval<NaiveDateTime>>,
    pub rejected: Vec<RejectedRecord>,
    /// Exact repeats removed from `intervals`.
    pub duplicates: usize,
}

/// Which end of a stay a date-only value describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayBoundary {
    /// Date-only values mean the first second of the day.
    Start,
    /// Date-only values mean the last second of the day.
    End,
}

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses a date or date-time, resolving date-only values per `boundary`.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD HH:MM:SS` (each with
/// optional fractional seconds) and RFC 3339, which is converted to UTC.
pub fn parse_instant(value: &str, boundary: DayBoundary) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let time = match boundary {
            DayBoundary::Start => NaiveTime::MIN,
            DayBoundary::End => NaiveTime::from_hms_opt(23, 59, 59)?,
        };
        return Some(date.and_time(time));
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.naive_utc())
}

/// Rounds a date-time to the nearest calendar day; noon rounds up.
pub fn round_to_day(dt: NaiveDateTime) -> NaiveDate {
    let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN);
    if dt.time() >= noon {
        dt.date() + TimeDelta::days(1)
    } else {
        dt.date()
    }
}

/// Turns raw episodes into validated intervals.
#[derive(Debug, Clone, Default)]
pub struct EpisodeNormalizer {
    rules: Vec<CompiledRule>,
}

impl EpisodeNormalizer {
    /// Creates a normalizer applying the given exclusion rules.
    pub fn new(rules: &[ExclusionRule]) -> Result<Self, ValidationError> {
        let rules = rules
            .iter()
            .map(|rule| {
                let pattern = rule
                    .matches
                    .as_deref()
                    .map(Regex::new)
                    .transpose()
                    .map_err(|err| ValidationError::InvalidPattern {
                        rule: rule.name.clone(),
                        message: err.to_string(),
                    })?;
                Ok(CompiledRule {
                    name: rule.name.clone(),
                    field: rule.field,
                    equals: rule.equals.iter().cloned().collect(),
                    pattern,
                })
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;
        Ok(Self { rules })
    }

    /// Canonicalizes a single record.
    pub fn normalize_one(
        &self,
        episode: &RawEpisode,
    ) -> Result<RawInterval<NaiveDateTime>, RejectReason> {
        let subject = present(episode.subject.as_deref()).ok_or(RejectReason::MissingField {
            field: "subject",
        })?;
        let label = present(episode.label.as_deref())
            .ok_or(RejectReason::MissingField { field: "label" })?;
        let admitted = present(episode.admitted.as_deref())
            .ok_or(RejectReason::MissingField { field: "admitted" })?;
        let discharged = present(episode.discharged.as_deref()).ok_or(
            RejectReason::MissingField {
                field: "discharged",
            },
        )?;

        for rule in &self.rules {
            let value = match rule.field {
                RuleField::Subject => subject,
                RuleField::Label => label,
            };
            if rule.excludes(value) {
                return Err(RejectReason::Excluded {
                    rule: rule.name.clone(),
                });
            }
        }

        let start = parse_instant(admitted, DayBoundary::Start).ok_or_else(|| {
            RejectReason::UnparseableDate {
                field: "admitted",
                value: admitted.to_string(),
            }
        })?;
        let end = parse_instant(discharged, DayBoundary::End).ok_or_else(|| {
            RejectReason::UnparseableDate {
                field: "discharged",
                value: discharged.to_string(),
            }
        })?;

        let subject = SubjectId::new(subject).map_err(|_| RejectReason::MissingField {
            field: "subject",
        })?;
        let label = RegionLabel::new(label)
            .map_err(|_| RejectReason::MissingField { field: "label" })?;

        RawInterval::new(subject, start, end, label).map_err(|_| RejectReason::Inverted {
            start: start.to_string(),
            end: end.to_string(),
        })
    }

    /// Normalizes a batch of numbered records.
    ///
    /// Rejected records are collected with their number; exact duplicate intervals
    /// are removed.
    pub fn normalize<I>(&self, records: I) -> Normalized
    where
        I: IntoIterator<Item = (usize, RawEpisode)>,
    {
        let mut normalized = Normalized::default();
        let mut seen = HashSet::new();

        for (record, episode) in records {
            match self.normalize_one(&episode) {
                Ok(interval) => {
                    if seen.insert(interval.clone()) {
                        normalized.intervals.push(interval);
                    } else {
                        normalized.duplicates += 1;
                    }
                }
                Err(reason) => {
                    tracing::debug!(record, reason = %reason, "rejected episode");
                    normalized.rejected.push(RejectedRecord {
                        record,
                        subject: episode.subject.clone(),
                        reason,
                    });
                }
            }
        }

        if !normalized.rejected.is_empty() {
            tracing::warn!(
                rejected = normalized.rejected.len(),
                "rejected malformed episodes"
            );
        }
        tracing::debug!(
            accepted = normalized.intervals.len(),
            duplicates = normalized.duplicates,
            "normalized episodes"
        );

        normalized
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
