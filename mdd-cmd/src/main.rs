mod info;
mod state;

use std::io::stderr;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use mdd::dump::summary;
use mdd::unpack::{Unpacker, UnmappedPolicy};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a batch of .mdd dump files.
    ///
    /// Sections are merged into per-stream accumulation files in the data
    /// directory, complete SIO blocks are decoded into per-category output
    /// files, and processing state is persisted so later invocations pick
    /// up where this one left off. Finishes by printing the latest known
    /// offset per node for the retrieval tooling.
    Process {
        /// Directory for accumulation files, category output, and state.
        #[arg(short, long, default_value = "data", value_name = "dir")]
        data_dir: PathBuf,

        /// Keep the state store at this path instead of inside the data
        /// directory.
        #[arg(short, long, value_name = "path")]
        state: Option<PathBuf>,

        /// Route blocks with unmapped instrument IDs to this category
        /// instead of dropping them.
        #[arg(short, long, value_name = "category")]
        unmapped_category: Option<String>,

        /// Summary output format.
        #[arg(short, long, default_value = "text")]
        format: info::Format,

        /// Input dump files.
        inputs: Vec<PathBuf>,
    },
    /// List the sections contained in dump files without processing them.
    Info {
        /// Output format.
        #[arg(short, long, default_value = "text")]
        format: info::Format,

        /// Input dump files.
        inputs: Vec<PathBuf>,
    },
    /// Show the persisted processing state for a data directory.
    State {
        /// Directory holding the state store.
        #[arg(short, long, default_value = "data", value_name = "dir")]
        data_dir: PathBuf,

        /// Output format.
        #[arg(short, long, default_value = "text")]
        format: info::Format,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("MDD_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Process {
            data_dir,
            state,
            unmapped_category,
            format,
            inputs,
        } => {
            if inputs.is_empty() {
                bail!("no input files");
            }
            info!("processing {} dump files into {data_dir:?}", inputs.len());

            let mut unpacker = Unpacker::new(data_dir);
            if let Some(path) = state {
                unpacker = unpacker.with_state_path(path);
            }
            if let Some(category) = unmapped_category {
                unpacker =
                    unpacker.with_unmapped_policy(UnmappedPolicy::Bucket(category.clone()));
            }

            let sections = unpacker.process(inputs)?;
            info!("merged {} sections", sections.len());

            let nodes = summary::latest(&sections);
            info::print_latest(&nodes, format)
        }
        Commands::Info { format, inputs } => {
            if inputs.is_empty() {
                bail!("no input files");
            }
            info::info(inputs, format)
        }
        Commands::State { data_dir, format } => state::show(data_dir, format),
    }
}
