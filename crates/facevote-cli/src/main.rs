use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facevote_core::render_report;
use facevote_pipeline::{ComparisonRecord, ImagePair, ResultSink};
use facevote_vision::load_image;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod store;
mod wiring;

use config::Config;
use store::{read_records, JsonlSink, Statistics};

#[derive(Parser)]
#[command(name = "facevote", about = "Weighted-vote face verification across several oracles")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide whether two images show the same person
    Compare {
        image_a: PathBuf,
        image_b: PathBuf,
        /// Always run all three stages
        #[arg(long)]
        no_early_stop: bool,
        /// Votes required on one side to stop early
        #[arg(long)]
        threshold: Option<usize>,
        /// Print the full record as JSON
        #[arg(long)]
        json: bool,
        /// Do not append the result to the comparison log
        #[arg(long)]
        no_log: bool,
    },
    /// Summarize the comparison log
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Show effective configuration and which oracles are usable
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("loading configuration")?;

    match cli.command {
        Commands::Compare {
            image_a,
            image_b,
            no_early_stop,
            threshold,
            json,
            no_log,
        } => {
            if no_early_stop {
                config.pipeline.early_stop.enabled = false;
            }
            if let Some(threshold) = threshold {
                config.pipeline.early_stop.threshold = threshold;
            }
            let record = compare(&config, &image_a, &image_b, !no_log).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_record(&record);
            }
        }
        Commands::Stats { json } => {
            let records = read_records(&config.log_file)
                .with_context(|| format!("reading {}", config.log_file.display()))?;
            let stats = Statistics::from_records(&records);
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", stats.render());
            }
        }
        Commands::Status => print_status(&config),
    }

    Ok(())
}

async fn compare(
    config: &Config,
    image_a: &Path,
    image_b: &Path,
    log: bool,
) -> Result<ComparisonRecord> {
    let a = load_image(image_a, config.max_image_bytes)?;
    let b = load_image(image_b, config.max_image_bytes)?;
    tracing::info!(a = %a.fingerprint.label, b = %b.fingerprint.label, "images loaded");

    let sink: Option<Arc<dyn ResultSink>> = (log && config.log_enabled)
        .then(|| Arc::new(JsonlSink::new(config.log_file.clone())) as Arc<dyn ResultSink>);
    let orchestrator = wiring::build_orchestrator(config, sink);

    let inputs = [a.fingerprint, b.fingerprint];
    let pair = ImagePair::new(a.image, b.image);
    Ok(orchestrator.run(&pair, &inputs).await)
}

fn print_record(record: &ComparisonRecord) {
    println!("{}", render_report(&record.decision, &record.breakdown));
    println!();
    println!("Crop:  {}", stage_flag(record.crop_success));
    println!("Align: {}", stage_flag(record.align_success));
    println!(
        "Oracle calls: {}  Time: {} ms",
        record.oracle_calls, record.processing_ms
    );
    if !record.abstentions.is_empty() {
        println!("Abstentions:");
        for a in &record.abstentions {
            println!("  {:<9} {:<11} {}", a.stage, a.oracle, a.reason);
        }
    }
    println!("Run: {}", record.run_id);
}

fn stage_flag(flag: Option<bool>) -> &'static str {
    match flag {
        None => "not run",
        Some(true) => "ok",
        Some(false) => "failed (fallback to original)",
    }
}

fn print_status(config: &Config) {
    let pipeline = &config.pipeline;
    println!(
        "Early stop:    {} (threshold {})",
        if pipeline.early_stop.enabled { "on" } else { "off" },
        pipeline.early_stop.threshold
    );
    println!("Call timeout:  {}s", pipeline.call_timeout.as_secs());
    println!("Model dir:     {}", config.model_dir.display());
    println!(
        "Result log:    {}{}",
        config.log_file.display(),
        if config.log_enabled { "" } else { " (disabled)" }
    );
    println!("Oracles:");
    for s in wiring::oracle_status(config) {
        let mark = if s.usable { "ok" } else { "--" };
        println!("  [{mark}] {:<11} {:<11} {}", s.name, s.kind, s.detail);
    }
}
