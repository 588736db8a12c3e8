//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::annotate::AnnotateArgs;
use crate::commands::segment::SegmentArgs;
use crate::commands::segments::SegmentsArgs;

/// Hospital exclusion zones for longitudinal readings.
///
/// Merges admission episodes into per-subject segments tagged with CORE and
/// buffer regions, then labels point readings with the regions they fall in.
#[derive(Debug, Parser)]
#[command(name = "ez", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Segment admission episodes and record the run.
    Segment(SegmentArgs),

    /// Tag point readings with the regions of a recorded run.
    Annotate(AnnotateArgs),

    /// Export the segments of a recorded run as JSON Lines.
    Segments(SegmentsArgs),

    /// List recorded runs.
    Runs {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show which predicates hold for every combination of region labels.
    Predicates {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}
