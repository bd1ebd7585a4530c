//! growthlab - analyze longitudinal growth series from the command line
//!
//! Reads a JSON array of subjects (`id`, `group`, `timePoints`,
//! `measurements`) and prints the analysis as JSON on stdout. Logs go to
//! stderr and are controlled with `RUST_LOG`.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use growthlab_core::{AnalysisConfig, FilteringLevel, OutlierPreset, Subject};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "growthlab")]
#[command(version)]
#[command(about = "Outlier-aware exponential growth analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full analysis on a subjects JSON file
    Analyze {
        /// JSON array of subjects
        #[arg(value_name = "SUBJECTS")]
        input: PathBuf,

        /// Detection preset (ultraConservative, conservative, moderate)
        #[arg(short, long, value_name = "NAME")]
        preset: Option<OutlierPreset>,

        /// Filtering level (critical, criticalAndHigh, all)
        #[arg(short, long, value_name = "LEVEL")]
        level: Option<FilteringLevel>,

        /// TOML configuration file; --preset and --level override it
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Dispatch detection and matrices through the batch supervisor
        #[arg(long)]
        parallel: bool,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// List the detection presets and their thresholds
    Presets,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze {
            input,
            preset,
            level,
            config,
            parallel,
            pretty,
        } => {
            let config = build_config(config.as_deref(), preset, level, parallel)?;
            let subjects = load_subjects(&input)?;
            tracing::info!("Loaded {} subjects from {}", subjects.len(), input.display());

            let output = growthlab_core::run(&subjects, &config)?;
            let json = if pretty {
                serde_json::to_string_pretty(&output)?
            } else {
                serde_json::to_string(&output)?
            };
            println!("{json}");
        }
        Command::Presets => print_presets(),
    }
    Ok(())
}

/// Config file (or defaults) with command-line overrides applied
fn build_config(
    path: Option<&Path>,
    preset: Option<OutlierPreset>,
    level: Option<FilteringLevel>,
    parallel: bool,
) -> Result<AnalysisConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(preset) = preset {
        config.preset = Some(preset);
        config.detection = preset.config();
    }
    if let Some(level) = level {
        config.filtering_level = level;
    }
    if parallel {
        config.parallel.enabled = true;
    }
    config.validate()?;
    Ok(config)
}

fn load_subjects(path: &Path) -> Result<Vec<Subject>, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let subjects = serde_json::from_str(&content)
        .map_err(|e| format!("Invalid subjects JSON in {}: {}", path.display(), e))?;
    Ok(subjects)
}

fn print_presets() {
    println!(
        "{:<18} {:>10} {:>11} {:>6} {:>10}",
        "preset", "max_growth", "max_decline", "k", "min_group"
    );
    for preset in OutlierPreset::ALL {
        let c = preset.config();
        println!(
            "{:<18} {:>10} {:>11} {:>6} {:>10}",
            preset.name(),
            c.max_growth_rate,
            c.max_decline_rate,
            c.iqr_sensitivity,
            c.min_group_size_for_iqr
        );
    }
}
