//! Segment command: normalize episodes, build the exclusion zones, record the run.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use ez_core::{
    EpisodeNormalizer, RawEpisode, RegionConfig, RejectReason, RejectedRecord,
    build_daily_segmentation,
};
use ez_db::{Database, NewRun, RunSummary};

use crate::Config;

#[derive(Debug, Args)]
pub struct SegmentArgs {
    /// Admission episodes as JSON Lines.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Episodes read from a JSON Lines file, numbered by line.
#[derive(Debug, Default)]
pub struct EpisodeInput {
    pub episodes: Vec<(usize, RawEpisode)>,
    /// Lines that were not valid episode JSON.
    pub malformed: Vec<RejectedRecord>,
}

impl EpisodeInput {
    pub fn lines_read(&self) -> usize {
        self.episodes.len() + self.malformed.len()
    }
}

/// Reads episodes, keeping malformed lines as rejections instead of failing.
pub fn read_episodes<R: BufRead>(reader: R) -> Result<EpisodeInput> {
    let mut input = EpisodeInput::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<RawEpisode>(trimmed) {
            Ok(episode) => input.episodes.push((idx + 1, episode)),
            Err(err) => input.malformed.push(RejectedRecord {
                record: idx + 1,
                subject: None,
                reason: RejectReason::Malformed {
                    message: err.to_string(),
                },
            }),
        }
    }
    Ok(input)
}

/// JSON output structure.
#[derive(Debug, Serialize)]
pub struct SegmentReport {
    pub run: RunSummary,
    pub rejected: Vec<RejectedRecord>,
}

/// Segments the episodes in `input` and records the run.
pub fn segment_episodes(
    input: EpisodeInput,
    source: Option<String>,
    normalizer: &EpisodeNormalizer,
    config: &Config,
    regions: &RegionConfig,
    db: &mut Database,
) -> Result<SegmentReport> {
    let episodes_read = input.lines_read();
    let normalized = normalizer.normalize(input.episodes);

    let mut rejected = input.malformed;
    rejected.extend(normalized.rejected);
    rejected.sort_by_key(|record| record.record);

    let segmentation = build_daily_segmentation(&normalized.intervals, regions)
        .context("segmentation failed")?;

    let run = NewRun {
        input: source,
        episodes_read,
        duplicates: normalized.duplicates,
        settings: config.regions,
        stats: segmentation.stats,
    };
    let summary = db
        .record_run(&run, &segmentation.segments, &rejected)
        .context("failed to record run")?;

    tracing::info!(
        run_id = %summary.id,
        episodes = episodes_read,
        rejected = rejected.len(),
        segments = summary.segments,
        "segmentation complete"
    );

    Ok(SegmentReport {
        run: summary,
        rejected,
    })
}

// ========== Human-Readable Output ==========

/// Format a run report for human-readable output.
pub fn format_report(report: &SegmentReport) -> String {
    let run = &report.run;
    let mut output = String::new();

    writeln!(output, "Run {}", run.id).unwrap();
    if let Some(input) = &run.input {
        writeln!(output, "Input: {input}").unwrap();
    }
    writeln!(
        output,
        "Episodes: {} read, {} rejected, {} duplicate",
        run.episodes_read, run.rejected, run.duplicates
    )
    .unwrap();
    writeln!(
        output,
        "Stays: {} merged, {} longer than {} days",
        run.stays, run.qualifying_stays, run.settings.minimum_stay_days
    )
    .unwrap();
    writeln!(
        output,
        "Segments: {} across {} subjects",
        run.segments, run.subjects
    )
    .unwrap();

    if !report.rejected.is_empty() {
        writeln!(output).unwrap();
        writeln!(output, "Rejected:").unwrap();
        for record in &report.rejected {
            let subject = record
                .subject
                .as_deref()
                .map(|subject| format!(" ({subject})"))
                .unwrap_or_default();
            writeln!(
                output,
                "- line {}{subject}: {}",
                record.record, record.reason
            )
            .unwrap();
        }
    }

    output
}

// ========== Public Interface ==========

/// Runs the segment command.
pub fn run<W: Write>(
    writer: &mut W,
    args: &SegmentArgs,
    config: &Config,
    regions: &RegionConfig,
    db: &mut Database,
) -> Result<()> {
    let normalizer = config
        .normalizer()
        .context("invalid exclusion rules")?;
    let file = File::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    let input = read_episodes(BufReader::new(file))?;

    let report = segment_episodes(
        input,
        Some(args.input.display().to_string()),
        &normalizer,
        config,
        regions,
        db,
    )?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
    } else {
        write!(writer, "{}", format_report(&report))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use insta::assert_snapshot;

    const EPISODES: &str = r#"
{"subject":"P1","admitted":"2024-03-01","discharged":"2024-03-05","label":"APC"}
{"subject":"P1","admitted":"2024-03-04","discharged":"2024-03-07","label":"APC"}
not json
{"subject":"P1","admitted":"2024-03-01","discharged":"2024-03-05","label":"APC"}
{"subject":"P2","admitted":"2024-05-10","discharged":"2024-05-10","label":"APC"}
{"subject":"P3","admitted":"2024-01-10","label":"APC"}
"#;

    fn run_fixture(db: &mut Database) -> SegmentReport {
        let config = Config::default();
        let input = read_episodes(Cursor::new(EPISODES)).unwrap();
        segment_episodes(
            input,
            Some("episodes.jsonl".to_string()),
            &config.normalizer().unwrap(),
            &config,
            &config.region_config().unwrap(),
            db,
        )
        .unwrap()
    }

    #[test]
    fn read_episodes_numbers_lines_and_keeps_malformed() {
        let input = read_episodes(Cursor::new(EPISODES)).unwrap();
        assert_eq!(input.lines_read(), 6);
        assert_eq!(input.episodes[0].0, 2);
        assert_eq!(input.malformed.len(), 1);
        assert_eq!(input.malformed[0].record, 4);
    }

    #[test]
    fn segment_records_run_and_segments() {
        let mut db = Database::open_in_memory().unwrap();
        let report = run_fixture(&mut db);

        assert_eq!(report.run.episodes_read, 6);
        assert_eq!(report.run.rejected, 2);
        assert_eq!(report.run.duplicates, 1);
        assert_eq!(report.run.stays, 2);
        assert_eq!(report.run.qualifying_stays, 1);
        assert_eq!(report.run.segments, 3);

        let segments = db.segments_for_run(&report.run.id).unwrap();
        let rendered: Vec<String> = segments
            .iter()
            .map(|s| format!("{} {} {} {}", s.subject, s.start, s.end, s.labels))
            .collect();
        assert_eq!(
            rendered,
            vec![
                "P1 2024-02-16 2024-03-01 {BUFFER_BEFORE}",
                "P1 2024-03-01 2024-03-08 {CORE}",
                "P1 2024-03-08 2024-03-22 {BUFFER_AFTER}",
            ]
        );
    }

    #[test]
    fn segment_report_human_output() {
        let mut db = Database::open_in_memory().unwrap();
        let report = run_fixture(&mut db);
        let output = format_report(&report).replace(&report.run.id, "[RUN]");
        assert_snapshot!(output, @r"
        Run [RUN]
        Input: episodes.jsonl
        Episodes: 6 read, 2 rejected, 1 duplicate
        Stays: 2 merged, 1 longer than 2 days
        Segments: 3 across 1 subjects

        Rejected:
        - line 4: malformed record: expected ident at line 1 column 2
        - line 7 (P3): missing discharged
        ");
    }

    #[test]
    fn exclusion_rules_apply_before_segmentation() {
        let mut config = Config::default();
        config.exclusions = vec![ez_core::ExclusionRule {
            name: "p1".to_string(),
            field: ez_core::RuleField::Subject,
            equals: vec!["P1".to_string()],
            matches: None,
        }];
        let mut db = Database::open_in_memory().unwrap();
        let input = read_episodes(Cursor::new(EPISODES)).unwrap();
        let report = segment_episodes(
            input,
            None,
            &config.normalizer().unwrap(),
            &config,
            &config.region_config().unwrap(),
            &mut db,
        )
        .unwrap();

        assert_eq!(report.run.segments, 0);
        assert_eq!(
            report
                .rejected
                .iter()
                .filter(|r| matches!(r.reason, RejectReason::Excluded { .. }))
                .count(),
            3
        );
    }
}
