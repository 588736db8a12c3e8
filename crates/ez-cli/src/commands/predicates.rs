//! Predicates command: print the predicate truth table over region labels.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;

use ez_core::predicate::PredicateRow;
use ez_core::{RegionPredicate, predicate_table};

/// Format the truth table, listing the predicates that hold for each label set.
pub fn format_table(rows: &[PredicateRow]) -> String {
    let mut output = String::new();
    writeln!(output, "{:<35}  TRUE PREDICATES", "LABELS").unwrap();
    for row in rows {
        let holding: Vec<&str> = RegionPredicate::ALL
            .into_iter()
            .map(RegionPredicate::name)
            .filter(|name| row.predicates.get(name).copied().unwrap_or(false))
            .collect();
        writeln!(output, "{:<35}  {}", row.labels.to_string(), holding.join(", ")).unwrap();
    }
    output
}

/// Runs the predicates command.
pub fn run<W: Write>(writer: &mut W, json: bool) -> Result<()> {
    let table = predicate_table();
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&table)?)?;
    } else {
        write!(writer, "{}", format_table(&table))?;
    }
    Ok(())
}
