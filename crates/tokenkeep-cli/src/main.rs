mod cli;
mod commands;
mod config;
mod storage;

use crate::cli::{Command, ConfigCommand};
use clap::Parser;
use color_eyre::Result;
use tokenkeep_core::records::TokenRecord;
use tokenkeep_vault::TokenStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Entry point wiring the CLI to the token store.
#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command.unwrap_or(Command::List) {
        Command::Version => print_version(),
        Command::Config(ConfigCommand::Init) => init_config(&config)?,
        command => {
            let store = storage::open_store(&config).await?;
            let outcome = run(command, &store).await;
            // Shutdown sweeps expired handles whether or not the command succeeded.
            store.shutdown().await;
            outcome?
        }
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("tokenkeep {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

async fn run(command: Command, store: &TokenStore) -> Result<()> {
    match command {
        Command::Health => {
            run_store_health(store).await?;
            println!("Storage: ok");
        }
        Command::Token(cmd) => commands::handle_token(cmd, store).await?,
        Command::Params(cmd) => commands::handle_params(cmd, store).await?,
        Command::Remove { handle } => {
            store
                .remove(&handle)
                .await
                .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
            println!("Removed {handle}");
        }
        Command::RemoveAll => {
            store
                .remove_all()
                .await
                .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
            println!("Removed all handles");
        }
        Command::List => {
            let handles = store
                .handles()
                .await
                .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
            if handles.is_empty() {
                println!("No handles yet. Add one with `tokenkeep token save <handle>`.");
            }
            for handle in handles {
                println!("{handle}");
            }
        }
        // the sweep itself runs during shutdown
        Command::Sweep => println!("Sweeping handles unused for the retention period"),
        Command::Version | Command::Config(_) => {}
    }
    Ok(())
}

/// Round-trips a probe token through the active cipher and the bound backend.
async fn run_store_health(store: &TokenStore) -> Result<()> {
    let probe_handle = "health/probe";
    let probe = TokenRecord::new("probe-access", "probe-refresh");
    store
        .save_token(probe_handle, Some(&probe))
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    let round_trip = store
        .load_token(probe_handle)
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    store
        .remove(probe_handle)
        .await
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;

    if round_trip.as_ref() != Some(&probe) {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    Ok(())
}
