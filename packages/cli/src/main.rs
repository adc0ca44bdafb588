#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for zone priority scoring.
//!
//! Reads a TOML analysis file naming the zone polygons, the feature layers
//! and the weighted criteria, scores every zone, prints a summary, and
//! optionally exports the results as JSON, CSV, or `GeoJSON`.

mod config;
mod error;
mod export;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use priority_map_scoring_models::SummaryStatistics;

use crate::config::AnalysisConfig;

#[derive(Parser)]
#[command(name = "priority_map", about = "Multi-criteria zone priority scoring")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every zone and print the summary
    Score {
        /// Analysis TOML file
        #[arg(long)]
        config: PathBuf,
        /// Write the full run as JSON
        #[arg(long)]
        output: Option<PathBuf>,
        /// Write one CSV row per zone
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Write zone polygons with their results as `GeoJSON`
        #[arg(long)]
        geojson: Option<PathBuf>,
        /// Override the number of zones in the ranking
        #[arg(long)]
        top: Option<usize>,
    },
    /// Load all inputs and check the configuration without scoring
    Validate {
        /// Analysis TOML file
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Score {
            config,
            output,
            csv,
            geojson,
            top,
        } => {
            let analysis = AnalysisConfig::load(&config)?;
            let mut pipeline = analysis.pipeline()?;
            if let Some(top) = top {
                pipeline = pipeline.with_top_n(top);
            }
            let zones = analysis.load_zones()?;
            let layers = analysis.load_layers()?;

            let run = pipeline.run(&zones, &layers)?;
            print_summary(&run.summary);

            if let Some(path) = output {
                export::write_json(&run, &path)?;
            }
            if let Some(path) = csv {
                export::write_csv(&run, pipeline.criteria(), &path)?;
            }
            if let Some(path) = geojson {
                export::write_geojson(&run, &zones, &path)?;
            }
        }
        Commands::Validate { config } => {
            let analysis = AnalysisConfig::load(&config)?;
            let pipeline = analysis.pipeline()?;
            let zones = analysis.load_zones()?;
            let layers = analysis.load_layers()?;
            pipeline.validate_inputs(&zones, &layers)?;

            println!(
                "Configuration OK: {} zones, {} layers, {} criteria",
                zones.len(),
                layers.names().count(),
                pipeline.criteria().len()
            );
        }
    }

    Ok(())
}

fn print_summary(summary: &SummaryStatistics) {
    println!("Zones scored: {}", summary.zone_count);
    println!(
        "Priority score: mean {:.2}, median {:.2}, std dev {:.2}, range {:.2}..{:.2}",
        summary.mean, summary.median, summary.std_dev, summary.min, summary.max
    );

    println!();
    println!("Tiers:");
    for tier in &summary.tiers {
        println!(
            "  {:<12} {:>6} ({:.1}%)",
            tier.label, tier.count, tier.percentage
        );
    }

    println!();
    println!("Criteria:");
    for criterion in &summary.criteria {
        println!(
            "  {:<20} weight {:.3}, max raw {:.3}, mean normalized {:.2}, {} zones non-zero",
            criterion.criterion,
            criterion.weight,
            criterion.max_raw,
            criterion.mean_normalized,
            criterion.nonzero_zones
        );
    }

    println!();
    println!("Top {} zones:", summary.top_zones.len());
    for zone in &summary.top_zones {
        println!(
            "  {:>3}. {:<20} {:>7.2}  {}",
            zone.rank,
            zone.zone_id.to_string(),
            zone.priority_score,
            zone.tier
        );
    }
}
