use std::{net::SocketAddr, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod chart;
mod config;
mod dataset;
mod error;
mod pipeline;
mod records;
mod server;

use config::{
    PipelineConfig, ServerConfig, DEFAULT_INPUT_DIR, DEFAULT_OUTPUT_FILE, DEFAULT_TARGET_PRODUCT,
};

/// Pink Morsel sales: clean raw POS extracts and chart the result.
#[derive(Parser, Debug)]
#[command(name = "morsel-sales", version, about)]
struct Cli {
    /// Log filter directive, e.g. `info` or `morsel_sales=debug`
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Combine the CSV extracts in a directory into the sales file
    Process {
        #[arg(long, default_value = DEFAULT_INPUT_DIR)]
        input_dir: PathBuf,

        #[arg(long, default_value = DEFAULT_OUTPUT_FILE)]
        output: PathBuf,

        /// Product kept after normalization (trimmed, lower-cased)
        #[arg(long, default_value = DEFAULT_TARGET_PRODUCT)]
        product: String,
    },
    /// Serve the interactive sales chart
    Serve {
        #[arg(long, default_value = DEFAULT_OUTPUT_FILE)]
        dataset: PathBuf,

        #[arg(long, default_value = "127.0.0.1:8050")]
        bind: SocketAddr,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Command::Process {
            input_dir,
            output,
            product,
        } => {
            let config = PipelineConfig::new(input_dir, output, &product);
            let report = pipeline::run(&config).context("sales pipeline failed")?;
            info!(
                files = report.files,
                combined = report.combined_rows,
                written = report.matched_rows,
                output = %report.output.display(),
                "pipeline finished"
            );
        }
        Command::Serve { dataset, bind } => {
            let config = ServerConfig {
                dataset_path: dataset,
                bind_addr: bind,
                ..ServerConfig::default()
            };
            // One thread: renders never run concurrently.
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("failed to start runtime")?
                .block_on(server::serve(config))?;
        }
    }

    Ok(())
}
