// SPDX-License-Identifier: GPL-3.0-or-later
mod render;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pfwatch_application::{AddOutcome, AppState};
use pfwatch_client::PartyFinderClient;
use pfwatch_config::{load as load_config, AppConfig, TelemetryConfig};
use pfwatch_domain::{Category, ListingId, ListingQuery};
use pfwatch_infrastructure::init_store;
use pfwatch_scheduler::Scheduler;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Track Party Finder listings and get alerted when a party fills up.
#[derive(Parser, Debug)]
#[command(name = "pfwatch")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll tracked listings until interrupted
    Watch,
    /// Track a listing by id
    Add { id: ListingId },
    /// Stop tracking a listing
    Remove { id: ListingId },
    /// Show tracked listings
    List,
    /// Drop tracked listings by status
    Clear {
        #[arg(value_enum)]
        target: ClearTarget,
    },
    /// Show or change the alert sound preference
    Sound {
        #[arg(value_enum, default_value = "status")]
        action: SoundAction,
    },
    /// Browse current listings
    Search(SearchArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ClearTarget {
    Fulfilled,
    Expired,
    All,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SoundAction {
    On,
    Off,
    Toggle,
    Status,
}

#[derive(clap::Args, Debug, Default)]
struct SearchArgs {
    /// API category name or its Chinese label
    #[arg(long)]
    category: Option<String>,
    /// Datacenter, or several joined by commas
    #[arg(long)]
    datacenter: Option<String>,
    #[arg(long)]
    world: Option<String>,
    /// Free-text search
    #[arg(short, long)]
    query: Option<String>,
    /// Duty id, repeatable
    #[arg(long)]
    duty: Vec<u32>,
    #[arg(long)]
    page: Option<u32>,
    #[arg(long)]
    per_page: Option<u32>,
}

impl SearchArgs {
    fn to_query(&self) -> ListingQuery {
        let mut query = ListingQuery::new();
        if let Some(category) = &self.category {
            query = query.category(Category::parse(category));
        }
        if let Some(datacenter) = &self.datacenter {
            query = query.datacenter(datacenter.clone());
        }
        if let Some(world) = &self.world {
            query = query.world(world.clone());
        }
        if let Some(search) = &self.query {
            query = query.search(search.clone());
        }
        for duty in &self.duty {
            query = query.duty(*duty);
        }
        if let Some(page) = self.page {
            query = query.page(page);
        }
        if let Some(per_page) = self.per_page {
            query = query.per_page(per_page);
        }
        query
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.telemetry);

    run(cli.command, config).await
}

fn init_tracing(telemetry: &TelemetryConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&telemetry.log_level));

    let fmt_layer = if telemetry.json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn build_client(config: &AppConfig) -> Result<PartyFinderClient> {
    PartyFinderClient::builder()
        .base_url(config.api.base_url.clone())
        .timeout(Duration::from_secs(config.api.timeout_secs))
        .build()
        .context("invalid listing API settings")
}

async fn build_state(config: AppConfig) -> Result<AppState> {
    let client = build_client(&config)?;
    let store = init_store(&config.storage).await?;
    let alert = pfwatch_alerts::from_config(&config.alerts);
    info!(target: "cli", alert = ?alert.kind(), "alert adapter ready");
    let state = AppState::new(config, Arc::new(client), Arc::new(store), alert).await;
    state.on_start().await;
    Ok(state)
}

async fn run(command: Command, config: AppConfig) -> Result<()> {
    if let Command::Search(args) = &command {
        let client = build_client(&config)?;
        let page = client.search(&args.to_query()).await?;
        print!("{}", render::search_results(&page));
        return Ok(());
    }

    let state = build_state(config).await?;

    match command {
        Command::Watch => watch(state).await?,
        Command::Add { id } => {
            let tracked = state.track_by_id(id).await?;
            match tracked.outcome {
                AddOutcome::Added => {
                    println!("tracking {}", id);
                    if let Some(report) = &tracked.check {
                        println!("{}", render::pass_report(report));
                    }
                    if let Some(entry) = state.favorites.get(id).await {
                        println!("status: {}", entry.status());
                    }
                }
                AddOutcome::AlreadyTracked => println!("{} is already tracked", id),
            }
        }
        Command::Remove { id } => {
            if state.favorites.remove(id).await {
                println!("removed {}", id);
            } else {
                println!("{} was not tracked", id);
            }
        }
        Command::List => {
            let listings = state.favorites.snapshot().await;
            print!("{}", render::favorites_table(&listings, state.favorites.capacity()));
        }
        Command::Clear { target } => {
            let removed = match target {
                ClearTarget::Fulfilled => state.favorites.clear_fulfilled().await,
                ClearTarget::Expired => state.favorites.clear_expired().await,
                ClearTarget::All => {
                    let count = state.favorites.len().await;
                    state.favorites.clear_all().await;
                    count
                }
            };
            println!("removed {} listing(s)", removed);
        }
        Command::Sound { action } => {
            let enabled = match action {
                SoundAction::On => {
                    state.favorites.set_sound_enabled(true).await;
                    true
                }
                SoundAction::Off => {
                    state.favorites.set_sound_enabled(false).await;
                    false
                }
                SoundAction::Toggle => state.favorites.toggle_sound().await,
                SoundAction::Status => state.favorites.sound_enabled().await,
            };
            println!("sound alerts {}", if enabled { "on" } else { "off" });
        }
        Command::Search(_) => {}
    }
    Ok(())
}

async fn watch(state: AppState) -> Result<()> {
    let scheduler = Scheduler::new(state.config.clone(), state.reconciler.clone());
    scheduler.register_jobs().await;
    let handle = scheduler.start().await;
    info!(
        target: "cli",
        interval_secs = state.config.tracker.poll_interval_secs,
        "watching favorites, press Ctrl-C to stop"
    );

    shutdown_signal().await?;
    handle.shutdown().await;

    let listings = state.favorites.snapshot().await;
    print!("{}", render::favorites_table(&listings, state.favorites.capacity()));
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut interrupt = signal(SignalKind::interrupt()).context("install SIGINT handler")?;
        let mut terminate = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
        tokio::select! {
            _ = interrupt.recv() => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await.context("install Ctrl-C handler")?;

    info!(target: "cli", "shutdown signal received");
    Ok(())
}
