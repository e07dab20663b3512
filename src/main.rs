//! trivia-oracle
//!
//! Run with: trivia-oracle [--config <path>] [command]
//!
//! Serve mode (default) reads chat events as JSON lines on stdin and
//! writes outbound actions as JSON lines on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::sync::broadcast;
use trivia_oracle::{
    gateway::{pump_events, StdioGateway},
    Category, Config, Fingerprinter, KnowledgeStore, Oracle,
};

const EVENT_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();

    let explicit_config = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args
                .get(i + 1)
                .cloned()
                .context("Usage: --config <path>")?;
            args.drain(i..=i + 1);
            Some(PathBuf::from(path))
        }
        None => None,
    };

    let config_path = Config::resolve_path(explicit_config.as_deref());
    let config = Config::load(&config_path)?;

    match args.first().map(|s| s.as_str()) {
        None | Some("--serve") => run_serve(config).await,
        Some("--hash") => {
            let url = args.get(1).context("Usage: --hash <url>")?;
            run_hash(&config, url).await
        }
        Some("--stats") => run_stats(&config).await,
        Some("--lookup") => {
            let category: Category = args
                .get(1)
                .context("Usage: --lookup <category> <fingerprint-or-country>")?
                .parse::<Category>()
                .map_err(anyhow::Error::msg)?;
            let value = args[2..].join(" ");
            if value.is_empty() {
                anyhow::bail!("Usage: --lookup <category> <fingerprint-or-country>");
            }
            run_lookup(&config, category, &value).await
        }
        Some(other) => anyhow::bail!("Unknown command: {}", other),
    }
}

async fn run_serve(config: Config) -> Result<()> {
    tracing::info!(
        "Serving {} channel(s), knowledge at {:?}",
        config.channel_ids.len(),
        config.data_dir
    );
    if config.channel_ids.is_empty() {
        tracing::warn!("Channel allow-list is empty, every event will be ignored");
    }

    let fingerprinter = Fingerprinter::http(config.fetch_timeout())?;

    let (events, receiver) = broadcast::channel(EVENT_BUFFER);
    let oracle = Oracle::new(
        config,
        fingerprinter,
        Arc::new(StdioGateway::stdout()),
        events.clone(),
    );

    let rounds = oracle.clone();
    let stdin = BufReader::new(tokio::io::stdin());
    let drained = async move {
        match pump_events(stdin, events).await {
            Ok(count) => tracing::info!("Input closed after {} events", count),
            Err(e) => tracing::error!("Reading events failed: {}", e),
        }
        // Let fetches, pending replies and open windows finish
        loop {
            tokio::time::sleep(Duration::from_millis(250)).await;
            if rounds.in_flight() == 0 {
                break;
            }
        }
    };
    let shutdown = async move {
        tokio::select! {
            _ = drained => {}
            _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted"),
        }
    };

    let handled = oracle.run(receiver, shutdown).await;
    tracing::info!("Handled {} events", handled);
    Ok(())
}

async fn run_hash(config: &Config, url: &str) -> Result<()> {
    let fingerprinter = Fingerprinter::http(config.fetch_timeout())?;
    let fingerprint = fingerprinter.fingerprint(url).await?;
    println!("{}", fingerprint);
    Ok(())
}

async fn run_stats(config: &Config) -> Result<()> {
    let store = KnowledgeStore::new(config.data_dir.clone());

    println!("Knowledge at {:?}", store.data_dir());
    let mut total = 0;
    for (category, count) in store.counts().await {
        println!("  {:<20} {:>6}", category.name(), count);
        total += count;
    }
    println!("  {:<20} {:>6}", "total", total);
    Ok(())
}

async fn run_lookup(config: &Config, category: Category, value: &str) -> Result<()> {
    let store = KnowledgeStore::new(config.data_dir.clone());
    match store.find_key(category, value).await {
        Some(key) => println!("{}", key),
        None => {
            eprintln!("No {} entry for {}", category, value);
            std::process::exit(1);
        }
    }
    Ok(())
}
