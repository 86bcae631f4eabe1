//! stridecache - inspect the query cache against a live backend.
//!
//! Usage:
//!   stridecache get <resource> [params...]
//!   stridecache update-workout <id> <json>
//!   stridecache resources
//!   stridecache config-path

use std::io;

use anyhow::{bail, Context, Result};
use stridecache_core::models::WorkoutUpdate;
use stridecache_core::{CacheConfig, KeyPart, QueryClient, QueryKey, Resource, Settings};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "\
Usage:
  stridecache get <resource> [params...]   Fetch a resource through the cache
  stridecache update-workout <id> <json>   Save workout changes and print the result
  stridecache resources                    List resources and their cache policy
  stridecache config-path                  Print the settings file location

Set RUST_LOG=debug to see cache activity.";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    match command.as_str() {
        "get" => get(rest).await,
        "update-workout" => update_workout(rest).await,
        "resources" => {
            list_resources(&Settings::load()?.cache_config());
            Ok(())
        }
        "config-path" => {
            println!("{}", Settings::config_path()?.display());
            Ok(())
        }
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}

fn client() -> Result<QueryClient> {
    let settings = Settings::load().context("Failed to load settings")?;
    QueryClient::from_settings(&settings)
}

async fn get(args: &[String]) -> Result<()> {
    let Some((resource, params)) = args.split_first() else {
        bail!("get: missing resource name\n\n{}", USAGE);
    };
    let params = params.iter().map(|p| KeyPart::parse(p)).collect();
    let key = QueryKey::from_parts(resource, params)?;

    let client = client()?;
    info!(key = %key, "Fetching");
    let state = client.fetch_query(&key).await;

    println!("{}", serde_json::to_string_pretty(&state)?);
    if let Some(error) = state.error {
        bail!("{} failed: {}", key, error);
    }
    Ok(())
}

async fn update_workout(args: &[String]) -> Result<()> {
    let [id, changes] = args else {
        bail!("update-workout: expected <id> <json>\n\n{}", USAGE);
    };
    let changes: WorkoutUpdate =
        serde_json::from_str(changes).context("Workout changes must be a JSON object")?;

    let client = client()?;
    let saved = client.update_workout(id, &changes).await?;
    println!("{}", serde_json::to_string_pretty(&saved)?);
    Ok(())
}

fn list_resources(config: &CacheConfig) {
    println!(
        "{:<16} {:<16} {:>10} {:>10} {:>6}",
        "RESOURCE", "PARAMS", "STALE", "RETENTION", "RETRY"
    );
    for resource in Resource::ALL {
        let policy = config.policy(resource);
        println!(
            "{:<16} {:<16} {:>9}s {:>9}s {:>6}",
            resource.name(),
            resource.params().join(","),
            policy.stale_time.as_secs(),
            policy.retention.as_secs(),
            policy.retry.max_retries
        );
    }
}
