//! CLI subcommand implementations.

pub mod annotate;
pub mod predicates;
pub mod runs;
pub mod segment;
pub mod segments;

use anyhow::{Context, Result};
use ez_db::{Database, RunSummary};

/// Resolves `--run`, falling back to the most recent run.
pub fn resolve_run(db: &Database, run: Option<&str>) -> Result<RunSummary> {
    match run {
        Some(id) => db
            .get_run(id)
            .with_context(|| format!("failed to look up run {id}"))?
            .with_context(|| format!("no run with id {id}")),
        None => db
            .latest_run()
            .context("failed to look up latest run")?
            .context("no recorded runs; run `ez segment` first"),
    }
}
