mod analysis;
mod applier;
mod config;
mod dates;
mod error;
mod exif_fields;
mod extractor;
mod geocoder;
mod imaging;
mod metadata;
mod orientation;
mod pairing;
mod pollution;
mod processor;
mod proposal;
mod walker;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::exif_fields::ExifTool;
use crate::pairing::FilePairer;
use crate::pollution::PollutionFilter;
use crate::processor::Processor;
use crate::proposal::ProposalParser;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "backscan-ocr")]
#[command(about = "Reconcile photo back-scan transcriptions into EXIF metadata")]
#[command(version)]
struct Cli {
    /// Extra configuration file layered over config/default and config/local
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log at debug level regardless of the configured level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pair front images with back scans and report coverage
    Discover {
        dir: PathBuf,
        /// Only look at the top-level directory
        #[arg(long)]
        no_recursive: bool,
        /// Also run the naming-pattern diagnostic
        #[arg(long)]
        patterns: bool,
        /// Also list images whose EXIF orientation is not upright
        #[arg(long)]
        orientation: bool,
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Downsize every back scan for the vision model
    Prepare {
        dir: PathBuf,
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,
    },
    /// Build the review document from stored vision replies
    Propose {
        dir: PathBuf,
        /// Directory holding `<album>/<back scan stem>.json` or `.txt` replies,
        /// mirroring the photo tree
        #[arg(short, long, value_name = "DIR")]
        analyses: PathBuf,
        #[arg(short, long, value_name = "FILE", default_value = "proposal.txt")]
        output: PathBuf,
    },
    /// Write the approved entries of an edited proposal
    Apply {
        proposal: PathBuf,
        dir: PathBuf,
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::new(cli.config.as_deref()).context("Failed to load configuration")?;

    // Initialize env_logger based on config.log_level
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        config.log_level.parse().unwrap_or(log::LevelFilter::Info)
    };
    env_logger::Builder::new().filter_level(level).init();

    info!("Starting backscan-ocr");

    match &cli.command {
        Command::Discover {
            dir,
            no_recursive,
            patterns,
            orientation,
            json,
        } => discover(
            &config,
            dir,
            !no_recursive && config.discovery.recursive,
            *patterns,
            *orientation,
            *json,
        )?,
        Command::Prepare { dir, output } => prepare(&config, dir, output)?,
        Command::Propose {
            dir,
            analyses,
            output,
        } => propose(&config, dir, analyses, output)?,
        Command::Apply {
            proposal,
            dir,
            dry_run,
        } => apply(&config, proposal, dir, *dry_run)?,
    }

    info!("backscan-ocr finished");
    Ok(())
}

fn discover(
    config: &AppConfig,
    dir: &Path,
    recursive: bool,
    patterns: bool,
    orientation: bool,
    json: bool,
) -> Result<()> {
    let pairer = FilePairer::new(&config.discovery);
    let discovery = pairer
        .discover(dir, recursive)
        .with_context(|| format!("Discovery failed in {:?}", dir))?;
    let stats = discovery.statistics();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Photo pairs: {}", stats.total_pairs);
        println!("  With back scan: {}", stats.with_backs);
        println!("  Without back scan: {}", stats.without_backs);
        println!("  Back coverage: {:.1}%", stats.back_coverage_percent);
        for (directory, counts) in &stats.by_directory {
            println!("  {}: {} photos, {} with backs", directory.display(), counts.total, counts.with_backs);
        }
        if !discovery.orphans.is_empty() {
            println!("Orphaned back scans: {}", discovery.orphans.len());
            for orphan in &discovery.orphans {
                println!("  {}", orphan.display());
            }
        }
    }

    if patterns {
        let report = pairer.analyze_naming_patterns(dir, recursive)?;
        println!("Naming patterns ({} files):", report.total_files);
        println!("  Suffix back scans: {}", report.suffix_backs.len());
        println!("  Prefix matches: {}", report.prefix_backs.len());
        for (marker, files) in &report.marker_backs {
            println!("  '{}' in name: {}", marker, files.len());
        }
        println!("  Suspicious names: {}", report.suspicious.len());
        println!("  Main photos: {}", report.main_photos.len());
        println!("  Back scan share: {:.1}%", report.back_scan_percentage());
        if report.possibly_missed() > 0 {
            println!(
                "  {} files look like back scans but lack a back suffix and will not be paired",
                report.possibly_missed()
            );
        }
    }

    if orientation {
        let tool = ExifTool::new(&config.exiftool_path);
        let report = orientation::orientation_report(&discovery, &tool);
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("Orientation ({} files checked):", report.checked);
            println!("  Not upright: {}", report.rotated.len());
            for rotated in &report.rotated {
                println!("    {} [{}]: {}", rotated.path.display(), rotated.orientation, rotated.correction);
            }
            if !report.unreadable.is_empty() {
                println!("  Unreadable: {}", report.unreadable.len());
            }
        }
    }
    Ok(())
}

fn prepare(config: &AppConfig, dir: &Path, output: &Path) -> Result<()> {
    let discovery = FilePairer::new(&config.discovery)
        .discover(dir, config.discovery.recursive)
        .with_context(|| format!("Discovery failed in {:?}", dir))?;
    let backs: Vec<&Path> = discovery.with_backs().filter_map(|p| p.back.as_deref()).collect();
    if output.exists() && !output.is_dir() {
        return Err(AppError::DirectoryNotFound(output.to_path_buf())).context("Preparation halted");
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.prepare.workers)
        .build()
        .context("Failed to start resize workers")?;
    info!(
        "Preparing {} back scans with {} workers",
        backs.len(),
        pool.current_num_threads()
    );

    let results: Vec<(&Path, Result<PathBuf, AppError>)> = pool.install(|| {
        backs
            .into_par_iter()
            .map(|back| {
                // album folders are mirrored so equal stems never collide
                let result = imaging::prepare_for_ocr(
                    back,
                    &output.join(discovery.relative_dir(back)),
                    config.prepare.max_dimension,
                    config.prepare.jpeg_quality,
                );
                (back, result)
            })
            .collect()
    });

    let (mut prepared, mut failed) = (0, 0);
    for (back, result) in results {
        match result {
            Ok(_) => prepared += 1,
            Err(e) if e.is_fatal() => return Err(e).context("Preparation halted"),
            Err(e) => {
                log::warn!("Failed to prepare {:?}: {}", back, e);
                failed += 1;
            }
        }
    }
    println!("Prepared {} back scans into {} ({} failed)", prepared, output.display(), failed);
    Ok(())
}

fn propose(config: &AppConfig, dir: &Path, analyses: &Path, output: &Path) -> Result<()> {
    let discovery = FilePairer::new(&config.discovery)
        .discover(dir, config.discovery.recursive)
        .with_context(|| format!("Discovery failed in {:?}", dir))?;

    let tool = ExifTool::new(&config.exiftool_path);
    let processor = Processor::new(config, &tool).context("Invalid extraction configuration")?;
    // a corrupt entry aborts here, before anything is written
    let writer = processor
        .build_proposal(&discovery, analyses)
        .context("Proposal generation halted")?;

    if writer.is_empty() {
        log::warn!("No photos found under {:?}; the proposal will be empty", dir);
    }
    writer
        .write(output)
        .with_context(|| format!("Failed to write proposal {:?}", output))?;

    let stats = writer.statistics();
    let with_warnings = writer.entries().iter().filter(|e| !e.warnings.is_empty()).count();
    println!("Proposal written to {}", output.display());
    println!(
        "  {} entries, {} with updates, {} with warnings, average confidence {:.2}",
        writer.len(),
        stats.with_updates,
        with_warnings,
        stats.average_confidence
    );
    Ok(())
}

fn apply(config: &AppConfig, proposal: &Path, dir: &Path, dry_run: bool) -> Result<()> {
    let filter = PollutionFilter::new(&config.extraction.pollution);
    let entries = ProposalParser::new(&config.proposal, filter)
        .parse_file(proposal)
        .with_context(|| format!("Failed to read proposal {:?}", proposal))?;

    let tool = ExifTool::new(&config.exiftool_path);
    let pairer = FilePairer::new(&config.discovery);
    let report = applier::apply(&entries, dir, &pairer, &tool, dry_run)
        .with_context(|| format!("Failed to apply proposal to {:?}", dir))?;

    println!(
        "{}{} updated, {} skipped, {} errors",
        if dry_run { "[dry-run] " } else { "" },
        report.updated,
        report.skipped,
        report.errors.len()
    );
    for error in &report.errors {
        println!("  {}", error);
    }
    Ok(())
}
