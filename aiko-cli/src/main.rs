//! CLI entry point for aiko

mod feed;

use aiko_channels::RelayBridge;
use aiko_core::bandit::DecisionEngine;
use aiko_core::bus::{ChatIngestor, EventBus, PriorityMessageQueue};
use aiko_core::config::{Config, ConfigLoader};
use aiko_core::director::Director;
use aiko_core::logging::init_logging;
use aiko_core::retrospective::SessionTally;
use aiko_core::utils::expand_tilde;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Source label for chat read from stdin
const FEED_SOURCE: &str = "stdin";

#[derive(Parser)]
#[command(name = "aiko")]
#[command(about = "Relay live chat into a virtual performer and learn what to do next")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay, reading newline-delimited JSON chat from stdin
    Run {
        /// Identifier used in the end-of-stream report
        #[arg(short, long)]
        stream_id: Option<String>,
    },
    /// Show effective configuration
    Status,
    /// Inspect or reset the learned action state
    Bandit {
        #[command(subcommand)]
        command: BanditCommands,
    },
}

#[derive(Subcommand)]
enum BanditCommands {
    /// Show per-action posterior parameters
    Show,
    /// Replace the saved state with uniform priors
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_loader = if let Some(dir) = cli.config_dir {
        ConfigLoader::with_dir(dir)
    } else {
        ConfigLoader::new()
    };

    match cli.command {
        Commands::Run { stream_id } => run_stream(&config_loader, stream_id).await?,
        Commands::Status => {
            init_cli_tracing();
            run_status(&config_loader)?;
        }
        Commands::Bandit { command } => {
            init_cli_tracing();
            match command {
                BanditCommands::Show => run_bandit_show(&config_loader)?,
                BanditCommands::Reset => run_bandit_reset(&config_loader)?,
            }
        }
    }

    Ok(())
}

/// Short-lived commands log to stderr only
fn init_cli_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn state_path(config: &Config) -> PathBuf {
    expand_tilde(&config.bandit.state_path)
}

/// Run the relay until Ctrl+C, then write the retrospective
async fn run_stream(loader: &ConfigLoader, stream_id: Option<String>) -> Result<()> {
    let config = loader.load().context("failed to load configuration")?;
    let _log_guard = init_logging(&config.logging);

    let state_path = state_path(&config);
    let engine = DecisionEngine::load_or_create(&state_path).into_shared();

    let bus = EventBus::new();
    let queue = PriorityMessageQueue::new();
    let tally = SessionTally::new();
    tally.attach(&bus).await;

    let ingestor = ChatIngestor::new(bus.clone(), queue.clone(), FEED_SOURCE);
    let bridge = Arc::new(RelayBridge::new(&config.relay, queue.clone()));
    let director = Director::new(
        Arc::clone(&engine),
        bus.clone(),
        config.director.clone(),
        &state_path,
    );
    let shutdown = CancellationToken::new();

    println!("{}", style("Starting aiko relay...").bold().cyan());
    println!("Session: {}", config.relay.url);
    println!("Bandit state: {}", state_path.display());

    let bridge_handle = {
        let bridge = Arc::clone(&bridge);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { bridge.run(shutdown).await })
    };

    let director_handle = {
        let director = director.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { director.run(shutdown).await })
    };

    let feed_handle = {
        let bus = bus.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let lines = feed::spawn_line_reader(BufReader::new(std::io::stdin()));
            tokio::select! {
                _ = shutdown.cancelled() => {}
                stats = feed::pump(lines, &ingestor, &bus, FEED_SOURCE) => {
                    info!(
                        "Chat feed ended: {} messages, {} viewer updates, {} skipped",
                        stats.messages, stats.viewer_updates, stats.skipped
                    );
                }
            }
        })
    };

    println!(
        "{}",
        style("Relay is running. Press Ctrl+C to stop.").green()
    );

    tokio::signal::ctrl_c().await?;
    println!("\n{}", style("Shutting down...").yellow());

    shutdown.cancel();
    for (name, handle) in [
        ("relay bridge", bridge_handle),
        ("director", director_handle),
    ] {
        if let Err(e) = handle.await {
            error!("{} task failed: {}", name, e);
        }
    }
    feed_handle.abort();
    let _ = feed_handle.await;

    if !queue.is_empty() {
        warn!("{} queued messages were not relayed", queue.len());
    }

    let stream_id =
        stream_id.unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d-%H%M").to_string());
    let summary = tally.summary(stream_id);
    println!("\n{}", summary.format_report());

    let updated = summary.apply_to(&mut engine.lock());
    info!(
        "Retrospective reward {:.2} applied to {:?}",
        summary.reward(),
        updated
    );
    director
        .persist()
        .with_context(|| format!("failed to save bandit state to {}", state_path.display()))?;

    println!("{}", style("Relay stopped.").green());
    Ok(())
}

/// Show effective configuration
fn run_status(loader: &ConfigLoader) -> Result<()> {
    let config = loader.load()?;
    let state_path = state_path(&config);

    println!("{}", style("Aiko Status").bold().cyan());
    println!("Version: {}\n", env!("CARGO_PKG_VERSION"));

    println!("{}", style("Configuration:").bold());
    println!("  Config directory: {}", loader.config_dir().display());
    let file_status = if loader.config_path().exists() {
        style("present").green()
    } else {
        style("defaults").dim()
    };
    println!("  Config file: {}", file_status);
    println!();

    println!("{}", style("Relay:").bold());
    println!("  Session URL: {}", config.relay.url);
    println!("  Reconnect delay: {}ms", config.relay.reconnect_delay_ms);
    println!();

    println!("{}", style("Bandit:").bold());
    let state_status = if state_path.exists() {
        style("saved").green()
    } else {
        style("not yet created").dim()
    };
    println!("  State: {} ({})", state_path.display(), state_status);
    println!();

    println!("{}", style("Director:").bold());
    let director_status = if config.director.enabled {
        style("enabled").green()
    } else {
        style("disabled").dim()
    };
    println!("  {} (every {}s)", director_status, config.director.interval_s);
    println!();

    println!("{}", style("Logging:").bold());
    println!(
        "  Level: {}  Format: {}  Dir: {}",
        config.logging.level, config.logging.format, config.logging.dir
    );

    Ok(())
}

fn run_bandit_show(loader: &ConfigLoader) -> Result<()> {
    let config = loader.load()?;
    let path = state_path(&config);

    let engine = if path.exists() {
        DecisionEngine::load(&path)
            .with_context(|| format!("failed to read bandit state from {}", path.display()))?
    } else {
        println!(
            "{}",
            style(format!("No saved state at {}, showing priors", path.display())).yellow()
        );
        DecisionEngine::with_default_actions()
    };

    print_engine(&engine, &path);
    Ok(())
}

fn print_engine(engine: &DecisionEngine, path: &Path) {
    println!("{}", style("Action posteriors").bold().cyan());
    println!("State file: {}\n", path.display());
    println!(
        "  {:<10} {:>8} {:>8} {:>9}",
        "action", "alpha", "beta", "expected"
    );

    let best = engine.exploit();
    for (action, arm) in engine.snapshot() {
        let line = format!(
            "  {:<10} {:>8.2} {:>8.2} {:>9.3}",
            action.as_str(),
            arm.alpha,
            arm.beta,
            arm.expected
        );
        if action == best {
            println!("{}", style(line).green().bold());
        } else {
            println!("{}", line);
        }
    }
}

fn run_bandit_reset(loader: &ConfigLoader) -> Result<()> {
    let config = loader.load()?;
    let path = state_path(&config);

    DecisionEngine::with_default_actions()
        .save(&path)
        .with_context(|| format!("failed to write bandit state to {}", path.display()))?;

    println!(
        "{} {}",
        style("Bandit state reset:").green().bold(),
        path.display()
    );
    Ok(())
}
