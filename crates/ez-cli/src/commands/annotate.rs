//! Annotate command: tag point readings with the regions of a recorded run.
//!
//! Readings are JSON objects, one per line, with arbitrary fields. Each one that
//! passes the cohort filter is written back unchanged apart from an added
//! `region_labels` array. The output file is written atomically.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use serde_json::{Map, Value};

use ez_core::normalize::{DayBoundary, parse_instant};
use ez_core::{Cohort, RegionPredicate, SegmentIndex, TimedEvent};
use ez_db::Database;

use super::resolve_run;

const LABELS_FIELD: &str = "region_labels";

#[derive(Debug, Args)]
pub struct AnnotateArgs {
    /// Point readings as JSON Lines.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Where to write the annotated readings.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Run to annotate against (defaults to the latest).
    #[arg(long)]
    pub run: Option<String>,

    /// Which readings to keep: all, in-hospital or out-hospital.
    #[arg(long, default_value = "all")]
    pub cohort: Cohort,

    /// Field holding the subject identifier.
    #[arg(long, default_value = "subject")]
    pub subject_field: String,

    /// Field holding the reading's date or date-time.
    #[arg(long, default_value = "timestamp")]
    pub time_field: String,
}

/// A reading parsed from one JSON line.
#[derive(Debug)]
struct Reading {
    record: Map<String, Value>,
    subject: String,
    day: NaiveDate,
}

impl TimedEvent<NaiveDate> for Reading {
    fn subject(&self) -> &str {
        &self.subject
    }

    fn timestamp(&self) -> NaiveDate {
        self.day
    }
}

/// Counts reported after annotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotateStats {
    pub read: usize,
    pub written: usize,
    pub in_exclusion_zone: usize,
}

fn parse_reading(line: &str, lineno: usize, subject_field: &str, time_field: &str) -> Result<Reading> {
    let value: Value =
        serde_json::from_str(line).with_context(|| format!("invalid JSON on line {lineno}"))?;
    let Value::Object(record) = value else {
        anyhow::bail!("line {lineno} is not a JSON object");
    };

    let subject = match record.get(subject_field) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => anyhow::bail!("missing {subject_field} on line {lineno}"),
    };
    let Some(Value::String(raw_time)) = record.get(time_field) else {
        anyhow::bail!("missing {time_field} on line {lineno}");
    };
    let day = parse_instant(raw_time, DayBoundary::Start)
        .with_context(|| format!("unparseable {time_field} on line {lineno}: {raw_time}"))?
        .date();

    Ok(Reading {
        record,
        subject,
        day,
    })
}

/// Streams readings from `reader` to `writer`, tagging and filtering each one.
pub fn annotate_stream<R: BufRead, W: Write>(
    reader: R,
    writer: &mut W,
    index: &SegmentIndex<NaiveDate>,
    args: &AnnotateArgs,
) -> Result<AnnotateStats> {
    let mut stats = AnnotateStats::default();
    let mut failure = None;

    let readings = reader
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let lineno = idx + 1;
            let parsed = line
                .with_context(|| format!("failed to read line {lineno}"))
                .and_then(|line| {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        return Ok(None);
                    }
                    parse_reading(trimmed, lineno, &args.subject_field, &args.time_field).map(Some)
                });
            parsed.transpose()
        })
        .map_while(|parsed| parsed.map_err(|err| failure = Some(err)).ok());

    for annotated in index.annotate(readings) {
        stats.read += 1;
        if RegionPredicate::InExclusionZone.evaluate(annotated.labels) {
            stats.in_exclusion_zone += 1;
        }
        if !args.cohort.includes(annotated.labels) {
            continue;
        }

        let mut record = annotated.event.record;
        record.insert(LABELS_FIELD.to_string(), serde_json::to_value(annotated.labels)?);
        serde_json::to_writer(&mut *writer, &record)?;
        writeln!(writer)?;
        stats.written += 1;
    }

    if let Some(err) = failure {
        return Err(err);
    }
    Ok(stats)
}

/// Writes to a sibling temp file, renaming over `path` only on success.
fn write_atomically<F>(path: &Path, write: F) -> Result<AnnotateStats>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<AnnotateStats>,
{
    let tmp_path = path.with_extension("tmp");
    let result = File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            let stats = write(&mut writer)?;
            writer.flush().context("failed to flush output")?;
            Ok(stats)
        })
        .and_then(|stats| {
            fs::rename(&tmp_path, path).with_context(|| {
                format!("failed to move {} to {}", tmp_path.display(), path.display())
            })?;
            Ok(stats)
        });

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

// ========== Public Interface ==========

/// Runs the annotate command.
pub fn run<W: Write>(writer: &mut W, args: &AnnotateArgs, db: &Database) -> Result<()> {
    let run = resolve_run(db, args.run.as_deref())?;
    let segments = db
        .segments_for_run(&run.id)
        .with_context(|| format!("failed to load segments for run {}", run.id))?;
    let index = SegmentIndex::new(segments).context("stored segments overlap")?;
    tracing::debug!(
        run_id = %run.id,
        subjects = index.subject_count(),
        segments = index.segment_count(),
        "built segment index"
    );

    let file = File::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    let stats = write_atomically(&args.output, |out| {
        annotate_stream(BufReader::new(file), out, &index, args)
    })?;

    tracing::info!(
        run_id = %run.id,
        read = stats.read,
        written = stats.written,
        cohort = %args.cohort,
        "annotation complete"
    );
    writeln!(
        writer,
        "Annotated {} readings against run {} ({} in exclusion zone)",
        stats.read, run.id, stats.in_exclusion_zone
    )?;
    writeln!(
        writer,
        "Wrote {} readings ({} cohort) to {}",
        stats.written,
        args.cohort,
        args.output.display()
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use chrono::TimeDelta;
    use ez_core::{CanonicalSegment, LabelSet, RegionLabel, SubjectId};

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + TimeDelta::days(offset)
    }

    fn index() -> SegmentIndex<NaiveDate> {
        let segment = |start, end, label| CanonicalSegment {
            subject: SubjectId::new("P1").unwrap(),
            start: day(start),
            end: day(end),
            labels: LabelSet::single(label),
        };
        SegmentIndex::new(vec![
            segment(-1, 1, RegionLabel::BUFFER_BEFORE),
            segment(1, 5, RegionLabel::CORE),
            segment(5, 7, RegionLabel::BUFFER_AFTER),
        ])
        .unwrap()
    }

    fn args(cohort: Cohort) -> AnnotateArgs {
        AnnotateArgs {
            input: PathBuf::from("in.jsonl"),
            output: PathBuf::from("out.jsonl"),
            run: None,
            cohort,
            subject_field: "patient".to_string(),
            time_field: "at".to_string(),
        }
    }

    const READINGS: &str = r#"{"patient":"P1","at":"2024-01-03T10:00:00","value":1}
{"patient":"P1","at":"2024-01-06","value":2}

{"patient":"P1","at":"2024-01-08","value":3}
{"patient":"P2","at":"2024-01-03","value":4}
"#;

    fn annotate(input: &str, cohort: Cohort) -> Result<(AnnotateStats, Vec<Value>)> {
        let mut out = Vec::new();
        let stats = annotate_stream(Cursor::new(input), &mut out, &index(), &args(cohort))?;
        let lines = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        Ok((stats, lines))
    }

    #[test]
    fn every_reading_is_kept_in_order_with_labels() {
        let (stats, lines) = annotate(READINGS, Cohort::All).unwrap();
        assert_eq!(
            stats,
            AnnotateStats {
                read: 4,
                written: 4,
                in_exclusion_zone: 2,
            }
        );
        let values: Vec<_> = lines.iter().map(|l| l["value"].as_i64().unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3, 4]);
        assert_eq!(lines[0][LABELS_FIELD], serde_json::json!(["CORE"]));
        assert_eq!(lines[1][LABELS_FIELD], serde_json::json!(["BUFFER_AFTER"]));
        assert_eq!(lines[2][LABELS_FIELD], serde_json::json!([]));
        assert_eq!(lines[3][LABELS_FIELD], serde_json::json!([]));
    }

    #[test]
    fn cohorts_filter_output() {
        let (_, inside) = annotate(READINGS, Cohort::InHospital).unwrap();
        let (stats, outside) = annotate(READINGS, Cohort::OutHospital).unwrap();
        assert_eq!(inside.len(), 2);
        assert_eq!(outside.len(), 2);
        assert_eq!(stats.read, 4);
        assert_eq!(outside[0]["value"], 3);
    }

    #[test]
    fn missing_subject_fails_with_line_number() {
        let input = "{\"patient\":\"P1\",\"at\":\"2024-01-03\"}\n{\"at\":\"2024-01-03\"}\n";
        let err = annotate(input, Cohort::All).unwrap_err();
        assert_eq!(err.to_string(), "missing patient on line 2");
    }

    #[test]
    fn bad_timestamp_fails_with_line_number() {
        let err = annotate("{\"patient\":\"P1\",\"at\":\"soon\"}\n", Cohort::All).unwrap_err();
        assert_eq!(err.to_string(), "unparseable at on line 1: soon");
    }

    #[test]
    fn failed_annotation_leaves_no_output_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("out.jsonl");
        let result = write_atomically(&path, |out| {
            annotate_stream(Cursor::new("[1, 2]\n"), out, &index(), &args(Cohort::All))
        });
        assert!(result.is_err());
        assert!(!path.exists());
        assert!(!path.with_extension("tmp").exists());
    }
}
