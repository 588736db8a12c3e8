//! Segments command: export the segments of a recorded run as JSON Lines.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;

use ez_db::Database;

use super::resolve_run;

#[derive(Debug, Args)]
pub struct SegmentsArgs {
    /// Run to export (defaults to the latest).
    #[arg(long)]
    pub run: Option<String>,
}

/// Runs the segments command.
pub fn run<W: Write>(writer: &mut W, args: &SegmentsArgs, db: &Database) -> Result<()> {
    let run = resolve_run(db, args.run.as_deref())?;
    let segments = db
        .segments_for_run(&run.id)
        .with_context(|| format!("failed to load segments for run {}", run.id))?;
    for segment in &segments {
        serde_json::to_writer(&mut *writer, segment)?;
        writeln!(writer)?;
    }
    tracing::debug!(run_id = %run.id, segments = segments.len(), "exported segments");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::NaiveDate;
    use ez_core::{CanonicalSegment, LabelSet, PipelineStats, RegionLabel, RegionSettings, SubjectId};
    use ez_db::NewRun;
    use insta::assert_snapshot;

    fn record(db: &mut Database, start_day: u32) -> String {
        let segment = CanonicalSegment {
            subject: SubjectId::new("P1").unwrap(),
            start: NaiveDate::from_ymd_opt(2024, 1, start_day).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, start_day + 4).unwrap(),
            labels: [RegionLabel::CORE, RegionLabel::BUFFER_AFTER].into_iter().collect::<LabelSet>(),
        };
        let run = NewRun {
            input: None,
            episodes_read: 1,
            duplicates: 0,
            settings: RegionSettings::default(),
            stats: PipelineStats::default(),
        };
        db.record_run(&run, &[segment], &[]).unwrap().id
    }

    #[test]
    fn exports_latest_run_by_default() {
        let mut db = Database::open_in_memory().unwrap();
        let first = record(&mut db, 1);
        record(&mut db, 10);

        let mut output = Vec::new();
        run(&mut output, &SegmentsArgs { run: None }, &db).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r#"{"subject":"P1","start":"2024-01-10","end":"2024-01-14","labels":["BUFFER_AFTER","CORE"]}"#);

        let mut output = Vec::new();
        run(&mut output, &SegmentsArgs { run: Some(first) }, &db).unwrap();
        assert!(String::from_utf8(output).unwrap().contains("2024-01-01"));
    }

    #[test]
    fn unknown_run_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        let err = run(&mut Vec::new(), &SegmentsArgs { run: Some("nope".to_string()) }, &db)
            .unwrap_err();
        assert_eq!(err.to_string(), "no run with id nope");
    }
}
