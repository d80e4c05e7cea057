//! Stemforge CLI
//!
//! Command-line interface for the stem separation pipeline.

use anyhow::Context;
use clap::Parser;
use log::info;
use tracing_subscriber::EnvFilter;

use stemforge::cli::commands::{self, CliContext};
use stemforge::cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    info!("Stemforge v{}", env!("CARGO_PKG_VERSION"));

    let Some(command) = cli.command else {
        println!("Stemforge v{}", env!("CARGO_PKG_VERSION"));
        println!("Use --help for available commands");
        return Ok(());
    };

    let ctx = CliContext::load(cli.config.as_deref(), cli.mock_models, cli.local_callback)
        .context("failed to load configuration")?;

    handle_command(&ctx, command)
}

fn handle_command(ctx: &CliContext, cmd: Commands) -> anyhow::Result<()> {
    let result = match cmd {
        Commands::Separate {
            input,
            strategy,
            output,
        } => commands::separate(ctx, &input, &strategy, output.as_deref()),
        Commands::DetectClips {
            stems_dir,
            threshold_db,
        } => commands::detect_clips(ctx, &stems_dir, threshold_db),
        Commands::CreateRecording {
            input,
            profile,
            name,
        } => commands::create_recording(ctx, &input, &profile, name.as_deref()),
        Commands::Process { recording_id } => commands::process(ctx, &recording_id),
        Commands::Status { recording_id } => commands::status(ctx, recording_id.as_deref()),
        Commands::RunJob { job } => commands::run_job(ctx, &job),
        Commands::Worker { listen } => commands::worker(ctx, listen),
        Commands::PrintConfig => commands::print_config(ctx),
    };

    result.map_err(|e| {
        let error = anyhow::Error::new(e);
        match error
            .downcast_ref::<stemforge::StemforgeError>()
            .and_then(|e| e.recovery_suggestion())
        {
            Some(hint) => error.context(format!("hint: {}", hint)),
            None => error,
        }
    })
}
