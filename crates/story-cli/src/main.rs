mod commands;
mod opts;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::browse::BrowseArgs;
use commands::build::BuildArgs;
use commands::import::ImportArgs;
use commands::run::RunArgs;
use opts::StoryOpts;

#[derive(Parser, Debug)]
#[command(name = "story", version, about = "Image story authoring CLI")]
struct Cli {
    #[command(flatten)]
    opts: StoryOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the story definition (or a render request) from an import payload
    Build(BuildArgs),

    /// Open an image or saved story through the import service
    Import(ImportArgs),

    /// Run an editing session fed by JSON lines on stdin
    Run(RunArgs),

    /// List a directory for the file picker
    Browse(BrowseArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let opts = &cli.opts;
    opts::load_env(&opts.root()?)?;
    setup_logging();

    match cli.command {
        Command::Build(args) => commands::build::cmd_build(opts, &args),
        Command::Import(args) => commands::import::cmd_import(opts, &args).await,
        Command::Run(args) => commands::run::cmd_run(opts, &args).await,
        Command::Browse(args) => commands::browse::cmd_browse(opts, &args).await,
    }
}

/// Log to stderr so stdout stays machine-readable. `RUST_LOG` overrides the
/// default `warn` level.
fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();
}
