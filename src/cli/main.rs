use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use azipi::config::Config;
use azipi::metadata::ExifTool;
use azipi::pipeline::{self, RunReport, RunSettings};
use azipi::sequence::{ConnectionOrder, ConnectionType, LinkSummary};

#[derive(Parser, Debug)]
#[command(
    name = "azipi",
    version,
    about = "Azimuth and pitch metadata setter for sequences of geotagged photos"
)]
struct Cli {
    /// Path to config file (default: azipi.json next to binary)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Calculate azimuth and pitch for every image in a folder
    Run(RunArgs),
    /// Write a default config file and exit
    Init,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to input folder
    input_directory: PathBuf,

    /// Path to output folder
    output_directory: PathBuf,

    /// Connection type: "time" (capture time of image) or "filename"
    #[arg(short = 'c', long)]
    connection_type: Option<String>,

    /// Connection order: "ascending" or "descending"
    #[arg(short = 'o', long)]
    connection_order: Option<String>,

    /// Discard images missing required metadata instead of stopping
    #[arg(short, long)]
    discard: bool,

    /// Path to the ExifTool executable
    #[arg(short, long, value_name = "PATH")]
    exiftool_path: Option<PathBuf>,

    /// Calculate and show the values without writing to files
    #[arg(long)]
    dry_run: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let args = match cli.command {
        Command::Init => {
            return match init(cli.config.as_deref()) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    log::error!("{e:#}");
                    ExitCode::FAILURE
                }
            };
        }
        Command::Run(args) => args,
    };

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e:#}");
            return ExitCode::from(2);
        }
    };

    match run(&args, config) {
        Ok(report) => {
            if args.json {
                let rows: Vec<LinkSummary> = report.linked.iter().map(LinkSummary::from).collect();
                match serde_json::to_string_pretty(&rows) {
                    Ok(json) => println!("{json}"),
                    Err(e) => log::error!("Failed to serialize results: {e}"),
                }
            } else if args.dry_run {
                print_links(&report);
            }
            if !args.dry_run {
                log::info!("Metadata successfully added to {} images", report.outputs.len());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

/// Handle `azipi init`.
fn init(path: Option<&Path>) -> Result<()> {
    let config = Config::default();
    config.save(path)?;
    let save_path = match path {
        Some(p) => p.to_path_buf(),
        None => Config::config_path()?,
    };
    println!("Default config written to {}", save_path.display());
    Ok(())
}

/// Merge command-line overrides into `config` and run the batch.
fn run(args: &RunArgs, mut config: Config) -> azipi::Result<RunReport> {
    if let Some(ref path) = args.exiftool_path {
        config.exiftool.path = Some(path.clone());
    }

    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    let (input_dir, output_dir) = pipeline::resolve_directories(
        &args.input_directory,
        &args.output_directory,
        exe_dir.as_deref(),
    )?;

    let settings = RunSettings {
        input_dir,
        output_dir,
        connection_type: args
            .connection_type
            .as_deref()
            .map(ConnectionType::from_alias)
            .unwrap_or(config.connection.connection_type),
        connection_order: args
            .connection_order
            .as_deref()
            .map(ConnectionOrder::from_alias)
            .unwrap_or(config.connection.order),
        discard: args.discard || config.discard,
        dry_run: args.dry_run,
        retry_delay: config.retry_delay(),
    };
    log::debug!("Settings: {settings:?}");

    let tool = ExifTool::new(&config.exiftool)?;
    log::debug!("Using ExifTool at {}", tool.executable().display());

    pipeline::run(&settings, &tool)
}

// ANSI color codes
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const YELLOW: &str = "\x1b[33m";

/// Print the derived values as a table for dry-run mode.
fn print_links(report: &RunReport) {
    println!();
    println!(
        "  {BOLD}{:<32} {:>10} {:>12} {:>10}{RESET}",
        "Image", "Azimuth", "Distance (m)", "Pitch"
    );
    println!("  {DIM}{}{RESET}", "─".repeat(67));

    for linked in &report.linked {
        let name = linked
            .record
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| linked.record.image_identifier.clone());
        let row = format!(
            "{:<32} {:>10.2} {:>12.2} {:>10.4}",
            truncate(&name, 32),
            linked.link.azimuth_degrees,
            linked.link.distance_meters,
            linked.link.pitch_ratio
        );
        if linked.link.is_extrapolated {
            println!("  {YELLOW}{row} *{RESET}");
        } else {
            println!("  {row}");
        }
    }

    println!("  {DIM}{}{RESET}", "─".repeat(67));
    println!("  {YELLOW}*{RESET} = last image, repeats the previous link");
    println!(
        "  {} found, {} dropped, {} linked",
        report.found,
        report.dropped,
        report.linked.len()
    );
    println!();
}

/// Shorten `s` to at most `max` characters, marking the cut with `…`.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
