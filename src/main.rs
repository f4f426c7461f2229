//! `pf` — the pipeline core's command-line entry point.

use anyhow::Result;
use clap::{Parser, Subcommand};
use pf_pipeline::{PipelineOptions, RunKind};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "pf", about = "Offline static-analysis pipeline orchestrator", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the analysis pipeline against a project.
    Run {
        /// Project root to analyze. Defaults to the current directory.
        #[arg(long)]
        root: Option<PathBuf>,
        /// Run against a diff spec (e.g. `main..HEAD`) instead of the full tree.
        #[arg(long)]
        diff: Option<String>,
        /// Suppress terminal progress output; `pipeline.log` still gets everything.
        #[arg(long)]
        quiet: bool,
        /// Skip phases that touch the network.
        #[arg(long)]
        offline: bool,
        /// Tell the indexer to exclude this tool's own source from the index.
        #[arg(long)]
        exclude_self: bool,
        /// Archive cache directories (`.cache`, `context`, `ml`) along with everything else.
        #[arg(long)]
        wipe_cache: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command {
        Command::Run { root, diff, quiet, offline, exclude_self, wipe_cache } => {
            let root = root
                .map(Ok)
                .unwrap_or_else(std::env::current_dir)?
                .canonicalize()?;

            let pf_dir = root.join(".pf");
            std::fs::create_dir_all(&pf_dir)?;
            let file_appender = tracing_appender::rolling::never(&pf_dir, "trace.log");
            let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(tracing_subscriber::EnvFilter::from_default_env())
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_ansi(!quiet))
                .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();

            let options = PipelineOptions {
                root,
                quiet,
                offline,
                exclude_self,
                wipe_cache,
                run_kind: match diff {
                    Some(spec) => RunKind::Diff(spec),
                    None => RunKind::Full,
                },
            };

            let code = pf_pipeline::run(options).await?;
            Ok(ExitCode::from(code as u8))
        }
    }
}
