//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use sitewatch_notify::{SmtpNotifier, send_digest};
use sitewatch_shared::{
    AppConfig, WatchStore, WatchTarget, WatchUrl, WatcherConfig, expand_path, init_config,
    load_config, load_config_from, smtp_password,
};
use sitewatch_storage::Storage;
use sitewatch_watcher::{HttpFetcher, Watcher};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SiteWatch — periodic page-change monitoring with an append-only history.
#[derive(Parser)]
#[command(
    name = "sitewatch",
    version,
    about = "Watch web pages for content changes and keep an append-only history.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Use a specific config file instead of ~/.sitewatch/sitewatch.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Write a default config file.
    Init,

    /// Run the watch pipeline until interrupted.
    Run,

    /// Register a URL on the watch-list.
    Add {
        /// URL to monitor.
        url: String,

        /// Human-readable name (defaults to the URL hostname).
        #[arg(short, long)]
        name: Option<String>,

        /// Free-form description.
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List registered watch targets.
    Targets,

    /// Show the stored observation history for a URL.
    History {
        /// URL to inspect.
        url: String,

        /// Maximum number of records to show.
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },

    /// Subscribe an email address to change digests for one or more URLs.
    Subscribe {
        /// Recipient address.
        email: String,

        /// URLs to subscribe to (repeatable).
        #[arg(short, long, required = true)]
        url: Vec<String>,
    },

    /// Send the change digest to all subscribers once.
    Digest,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Init => cmd_init().await,
        Command::Run => cmd_run(&config).await,
        Command::Add {
            url,
            name,
            description,
        } => cmd_add(&config, &url, name.as_deref(), description).await,
        Command::Targets => cmd_targets(&config).await,
        Command::History { url, limit } => cmd_history(&config, &url, limit).await,
        Command::Subscribe { email, url } => cmd_subscribe(&config, &email, &url).await,
        Command::Digest => cmd_digest(&config).await,
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let db_path = expand_path(&config.storage.db_path)?;
    Ok(Storage::open(&db_path).await?)
}

async fn cmd_init() -> Result<()> {
    let path = init_config()?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

async fn cmd_run(config: &AppConfig) -> Result<()> {
    let storage = Arc::new(open_storage(config).await?);

    // Seed configured targets so a fresh database starts with a watch-list.
    for entry in &config.targets {
        storage
            .add_watch_target(&WatchTarget {
                name: entry.name.clone(),
                url: entry.url.clone(),
                description: entry.description.clone(),
            })
            .await?;
    }
    if !config.targets.is_empty() {
        info!(count = config.targets.len(), "seeded watch targets from config");
    }

    let shutdown = CancellationToken::new();
    let fetcher = Arc::new(HttpFetcher::new()?);
    let watcher = Watcher::new(&WatcherConfig::from(config), shutdown.clone())?;

    watcher.run(storage.clone() as Arc<dyn WatchStore>, fetcher);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {
            return Err(eyre!("pipeline terminated on an unrecoverable error"));
        }
    }

    Ok(())
}

async fn cmd_add(
    config: &AppConfig,
    url: &str,
    name: Option<&str>,
    description: Option<String>,
) -> Result<()> {
    let parsed = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;

    let name = name
        .map(String::from)
        .unwrap_or_else(|| parsed.host_str().unwrap_or("unknown").to_string());

    let storage = open_storage(config).await?;
    storage
        .add_watch_target(&WatchTarget {
            name: name.clone(),
            url: WatchUrl::new(parsed.to_string()),
            description,
        })
        .await?;

    println!("Watching {parsed} as '{name}'");
    Ok(())
}

async fn cmd_targets(config: &AppConfig) -> Result<()> {
    let storage = open_storage(config).await?;
    let targets = storage.list_watch_targets().await?;

    if targets.is_empty() {
        println!("No watch targets registered. Add one with `sitewatch add <url>`.");
        return Ok(());
    }

    for target in targets {
        match &target.description {
            Some(description) => println!("{}  {}  — {description}", target.name, target.url),
            None => println!("{}  {}", target.name, target.url),
        }
    }
    Ok(())
}

async fn cmd_history(config: &AppConfig, url: &str, limit: u32) -> Result<()> {
    let storage = open_storage(config).await?;
    let records = storage
        .record_history(&WatchUrl::from(url), limit)
        .await?;

    if records.is_empty() {
        println!("No observations stored for {url}");
        return Ok(());
    }

    for record in records {
        let marker = if record.is_most_recent { "*" } else { " " };
        println!(
            "{marker} {}  {}  {} bytes",
            record.observed_at.to_rfc3339(),
            &record.content_hash[..12],
            record.content.len()
        );
    }
    Ok(())
}

async fn cmd_subscribe(config: &AppConfig, email: &str, urls: &[String]) -> Result<()> {
    let watch_urls: Vec<WatchUrl> = urls
        .iter()
        .map(|u| {
            Url::parse(u)
                .map(|parsed| WatchUrl::new(parsed.to_string()))
                .map_err(|e| eyre!("invalid URL '{u}': {e}"))
        })
        .collect::<Result<_>>()?;

    let storage = open_storage(config).await?;
    storage.add_subscription(email, &watch_urls).await?;

    println!("Subscribed {email} to {} URL(s)", watch_urls.len());
    Ok(())
}

async fn cmd_digest(config: &AppConfig) -> Result<()> {
    let password = smtp_password(config)?;
    let notifier = SmtpNotifier::new(&config.smtp, password)?;
    let storage = open_storage(config).await?;

    send_digest(&storage, &notifier).await?;
    println!("Digest sent.");
    Ok(())
}
