//! Replugged Installer
//!
//! Command-line front end for plugging Replugged into Discord.

mod progress;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use replugged_core::{Installation, InstallerConfig, PatchEngine, PayloadDownloader, Platform};

use progress::DownloadBar;

/// Exit status for operations that were cleanly rejected (e.g. not installed).
const EXIT_REJECTED: u8 = 2;

#[derive(Parser)]
#[command(name = "replugged-installer")]
#[command(about = "Install Replugged into Discord", long_about = None)]
struct Cli {
    /// Print machine-readable JSON where supported
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every Discord installation and whether it is plugged
    List,
    /// Show the state of one platform
    Status { platform: Platform },
    /// Plug Replugged into a platform
    Plug { platform: Platform },
    /// Restore a platform's original bundle
    Unplug { platform: Platform },
    /// Download the latest Replugged payload
    Download,
    /// Print the effective installer configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("replugged_core=info".parse()?)
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    tracing::debug!("Starting Replugged installer v{}", replugged_core::VERSION);

    let cli = Cli::parse();
    let config = InstallerConfig::from_env();

    match cli.command {
        Commands::List => {
            let engine = PatchEngine::with_defaults(&config);
            let installations = engine.probe().list_installations().await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&installations)?);
            } else {
                installations.iter().for_each(print_installation);
            }
        }
        Commands::Status { platform } => {
            let engine = PatchEngine::with_defaults(&config);
            let installation = engine.probe().probe(platform).await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&installation)?);
            } else {
                print_installation(&installation);
            }
        }
        Commands::Plug { platform } => {
            let engine = PatchEngine::with_defaults(&config);
            if !config.payload_path().exists() {
                tracing::warn!(
                    "No payload at {}; run `download` before starting Discord",
                    config.payload_path().display()
                );
            }
            let plugged = engine
                .plug(platform)
                .await
                .with_context(|| format!("Failed to plug {}", platform.display_name()))?;
            return Ok(report(plugged, "Plugged", platform));
        }
        Commands::Unplug { platform } => {
            let engine = PatchEngine::with_defaults(&config);
            let unplugged = engine
                .unplug(platform)
                .await
                .with_context(|| format!("Failed to unplug {}", platform.display_name()))?;
            return Ok(report(unplugged, "Unplugged", platform));
        }
        Commands::Download => {
            let downloader = Arc::new(PayloadDownloader::with_defaults(config));
            let (mut events, handle) = downloader.spawn();
            DownloadBar::new().follow(&mut events).await;
            handle.await.context("Download task panicked")??;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_installation(installation: &Installation) {
    let state = match (installation.installed, installation.plugged) {
        (false, _) => "not installed",
        (true, false) => "installed",
        (true, true) => "plugged",
    };
    match &installation.path {
        Some(path) => println!(
            "{:<20} {:<14} {}",
            installation.platform.display_name(),
            state,
            path.display()
        ),
        None => println!("{:<20} {}", installation.platform.display_name(), state),
    }
}

fn report(success: bool, verb: &str, platform: Platform) -> ExitCode {
    if success {
        println!("{} {}", verb, platform.display_name());
        ExitCode::SUCCESS
    } else {
        println!(
            "{} could not be {}: installation not found or unchanged",
            platform.display_name(),
            verb.to_lowercase()
        );
        ExitCode::from(EXIT_REJECTED)
    }
}
