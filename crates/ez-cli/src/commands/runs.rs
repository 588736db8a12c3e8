//! Runs command for listing recorded segmentation runs.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;

use ez_db::{Database, RunSummary};

// ========== Human-Readable Output ==========

/// Format runs for human-readable output.
pub fn format_runs(runs: &[RunSummary]) -> String {
    let mut output = String::new();

    writeln!(output, "RUNS").unwrap();
    writeln!(output).unwrap();

    if runs.is_empty() {
        writeln!(output, "No runs recorded.").unwrap();
        writeln!(output).unwrap();
        writeln!(
            output,
            "Hint: Run 'ez segment --input <episodes.jsonl>' to create one."
        )
        .unwrap();
        return output;
    }

    writeln!(
        output,
        "{:<8}  {:<24}  {:>8}  {:>8}  {:>8}  Input",
        "ID", "Created", "Episodes", "Rejected", "Segments"
    )
    .unwrap();
    writeln!(
        output,
        "────────  ────────────────────────  ────────  ────────  ────────  ──────────────"
    )
    .unwrap();

    for run in runs {
        let id_short: String = run.id.chars().take(8).collect();
        writeln!(
            output,
            "{:<8}  {:<24}  {:>8}  {:>8}  {:>8}  {}",
            id_short,
            run.created_at,
            run.episodes_read,
            run.rejected,
            run.segments,
            run.input.as_deref().unwrap_or("-")
        )
        .unwrap();
    }

    output
}

// ========== Public Interface ==========

/// Runs the runs command.
pub fn run<W: Write>(writer: &mut W, db: &Database, json: bool) -> Result<()> {
    let runs = db.list_runs()?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&runs)?)?;
    } else {
        write!(writer, "{}", format_runs(&runs))?;
    }
    Ok(())
}
