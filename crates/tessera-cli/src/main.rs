//! Tessera CLI - drive the build/execute engine from a terminal.

mod colors;
mod console;
mod document;
mod run;
mod translator;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tessera_core::RngType;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Build and debug Tessera model modules")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a prebuilt model module interactively
    Run {
        /// Path to the model module
        module: PathBuf,

        /// Build with breakpoint, stepping and variable-watch hooks
        #[arg(long)]
        debug: bool,

        /// Pin the random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Random number generator (mt19937, mt216091, xoshiro256+, xoshiro256**, trng)
        #[arg(long)]
        rng: Option<RngType>,

        /// Break at an operation handle (repeatable)
        #[arg(long = "break", value_name = "HANDLE")]
        breakpoints: Vec<u32>,

        /// Directory receiving the compiled module
        #[arg(long)]
        build_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            module,
            debug,
            seed,
            rng,
            breakpoints,
            build_dir,
        } => {
            run::execute(run::RunOptions {
                module,
                debug,
                seed,
                rng,
                breakpoints,
                build_dir,
            })
            .await
        }
    }
}
