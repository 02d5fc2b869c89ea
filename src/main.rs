//! brain-mirror: mirror a collaborative workspace to local Markdown.

use brain_mirror::{Config, Mirror, NodeId, run_with_shutdown};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// brain-mirror: workspace mirror
#[derive(Parser, Debug)]
#[command(name = "brain-mirror")]
#[command(about = "Mirror a collaborative document workspace to local Markdown")]
struct Args {
    /// JSON configuration file
    #[arg(short, long, default_value = "brain-mirror.json")]
    config: PathBuf,

    /// Enable verbose logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mirror continuously, re-exporting after every reconnect
    Run,
    /// Refresh the credential, back up (if enabled) and export the tree once
    Once,
    /// Refresh the credential and download + extract the workspace archive
    Backup,
    /// Export a single cell
    ExportCell {
        /// Cell id
        id: String,
        /// File name (defaults to the id)
        #[arg(long)]
        title: Option<String>,
        /// Export format (defaults to `export.cell_export_format`)
        #[arg(long)]
        format: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(&args.config)?;
    info!(config = %args.config.display(), brain_id = %config.workspace.brain_id, "starting brain-mirror");
    let mirror = Mirror::new(config)?;

    match args.command {
        Command::Run => run_with_shutdown(mirror).await?,
        Command::Once => {
            let credential = mirror.refresh_credential().await?;
            if mirror.config().backup.enabled {
                mirror.create_backup(&credential).await?;
            }
            let report = mirror
                .run_session(&credential, &CancellationToken::new())
                .await?;
            info!(
                path = %report.output_path.display(),
                nodes = report.visited,
                skipped = report.skipped.len(),
                leaves = report.leaves_inlined,
                "export finished"
            );
        }
        Command::Backup => {
            let credential = mirror.refresh_credential().await?;
            let files = mirror.create_backup(&credential).await?;
            info!(files = files.len(), "backup finished");
        }
        Command::ExportCell { id, title, format } => {
            let credential = mirror.refresh_credential().await?;
            let path = mirror
                .export_cell(
                    &credential,
                    &NodeId::from(id),
                    title.as_deref(),
                    format.as_deref(),
                )
                .await?;
            info!(path = %path.display(), "cell exported");
        }
    }

    Ok(())
}
