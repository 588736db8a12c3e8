use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ez_cli::commands::{annotate, predicates, runs, segment, segments};
use ez_cli::{Cli, Commands, Config};
use ez_core::RegionConfig;

/// Load and validate config. Invalid durations or rules abort startup.
fn load_config(cli: &Cli) -> Result<(Config, RegionConfig)> {
    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let regions = config
        .region_config()
        .context("invalid [regions] configuration")?;
    config.normalizer().context("invalid [[exclusions]] configuration")?;
    Ok((config, regions))
}

/// Open the database, ensuring the parent directory exists.
fn open_database(config: &Config) -> Result<ez_db::Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    ez_db::Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match &cli.command {
        Some(Commands::Segment(args)) => {
            let (config, regions) = load_config(&cli)?;
            let mut db = open_database(&config)?;
            segment::run(&mut out, args, &config, &regions, &mut db)?;
        }
        Some(Commands::Annotate(args)) => {
            let (config, _regions) = load_config(&cli)?;
            let db = open_database(&config)?;
            annotate::run(&mut out, args, &db)?;
        }
        Some(Commands::Segments(args)) => {
            let (config, _regions) = load_config(&cli)?;
            let db = open_database(&config)?;
            segments::run(&mut out, args, &db)?;
        }
        Some(Commands::Runs { json }) => {
            let (config, _regions) = load_config(&cli)?;
            let db = open_database(&config)?;
            runs::run(&mut out, &db, *json)?;
        }
        Some(Commands::Predicates { json }) => {
            // The truth table is static; no config or database needed
            predicates::run(&mut out, *json)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    out.flush()?;
    Ok(())
}
