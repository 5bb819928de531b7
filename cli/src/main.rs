// aca-workflows binary entry point

use access_common::backup::search_backup;
use access_common::bootstrap::{init_pipeline, init_workspace, load_settings};
use access_common::models::RunOptions;
use access_common::telemetry::{init_logging, LogFormat};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

/// Archive workflows: access files and backup search
#[derive(Parser, Debug)]
#[command(name = "aca-workflows")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ~/.aca/workflows/config.json)
    #[arg(long, global = true, env = "ACA_CONFIG")]
    config: Option<PathBuf>,

    /// Log level or filter directive; overrides the configured level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output: human or json
    #[arg(long, global = true, default_value = "human")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate access files for the records of a SAM export
    Accessfiles(AccessFilesArgs),

    /// Search a SAM backup export for records with a storage id
    Search(SearchArgs),
}

#[derive(Args, Debug)]
struct AccessFilesArgs {
    /// csv-file exported from SAM
    input: PathBuf,

    /// csv-file to re-import into SAM
    output: PathBuf,

    /// Do not watermark thumbnails
    #[arg(long, alias = "plain")]
    no_watermark: bool,

    /// Keep the access files local, do not upload
    #[arg(long)]
    local: bool,

    /// Replace existing access files and blobs
    #[arg(long)]
    overwrite: bool,

    /// Use the sandbox directories and the test container
    #[arg(long)]
    dryrun: bool,
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Backup csv-file
    backup: PathBuf,

    /// csv-file to write the matching ids to
    id_list: PathBuf,

    /// Storage id to search for
    #[arg(long)]
    storage_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(cli.config.as_deref())?;
    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| settings.observability.log_level.clone());
    init_logging(&log_level, cli.log_format)?;

    match cli.command {
        Command::Accessfiles(args) => {
            let options = RunOptions {
                no_watermark: args.no_watermark,
                local: args.local,
                overwrite: args.overwrite,
                dryrun: args.dryrun,
            };

            let workspace = init_workspace(&settings, &options)?;
            let pipeline = init_pipeline(&settings, &options)?;
            let report = pipeline
                .run(&args.input, &args.output, &options, &workspace)
                .await
                .context("Access file generation failed")?;

            info!(
                total = report.total,
                rows = report.rows_written,
                "Access file generation complete"
            );
        }
        Command::Search(args) => {
            let count = search_backup(&args.backup, &args.id_list, &args.storage_id)
                .context("Backup search failed")?;
            info!(count, "Backup search complete");
        }
    }

    Ok(())
}
