//! Command-line query runner
//!
//! Runs one query against the record namespace and prints the exported
//! JSON document, or writes it next to the working directory under the
//! conventional export file name.
//!
//! ```text
//! query <channels> <horizon> [--config <path>] [--out]
//!
//! channels   comma-separated channel list, e.g. google_play,app_store
//! horizon    All | "1 Year" | "6 Months" | "1 Month" | "1 Week"
//!            (short tags all/1yr/6mo/1mo/1w also accepted)
//! --config   TOML configuration file (env overrides still apply)
//! --out      write the JSON export to a file instead of stdout
//! ```

use std::sync::Arc;

use tracing::info;

use reviewscope::config::Config;
use reviewscope::engine::{export_file_name, QueryEngine};
use reviewscope::error::Error;
use reviewscope::horizon::Horizon;
use reviewscope::store::{RedisPool, RedisStore};
use reviewscope::types::QueryRequest;

struct Args {
    channels: Vec<String>,
    horizon: Horizon,
    config_path: Option<String>,
    write_file: bool,
}

fn usage() -> ! {
    eprintln!("usage: query <channels> <horizon> [--config <path>] [--out]");
    eprintln!("  e.g.: query google_play \"6 Months\"");
    std::process::exit(2);
}

fn parse_args() -> Result<Args, Error> {
    let mut positional = Vec::new();
    let mut config_path = None;
    let mut write_file = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => match args.next() {
                Some(path) => config_path = Some(path),
                None => usage(),
            },
            "--out" => write_file = true,
            "-h" | "--help" => usage(),
            _ => positional.push(arg),
        }
    }

    if positional.len() != 2 {
        usage();
    }

    let channels: Vec<String> = positional[0]
        .split(',')
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    if channels.is_empty() {
        usage();
    }
    let horizon: Horizon = positional[1].parse()?;

    Ok(Args {
        channels,
        horizon,
        config_path,
        write_file,
    })
}

async fn run() -> Result<(), Error> {
    let args = parse_args()?;

    let config = match &args.config_path {
        Some(path) => Config::from_file_with_env(path).map_err(Error::Configuration)?,
        None => Config::from_env(),
    };
    config.validate().map_err(Error::Configuration)?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.monitoring.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("reviewscope v{}", env!("CARGO_PKG_VERSION"));

    let pool = RedisPool::new(config.redis.to_pool_config()).await?;
    let store = Arc::new(RedisStore::new(pool));
    let engine = QueryEngine::new(store.clone(), &config.query);

    let request = QueryRequest::new(args.channels, args.horizon);
    let outcome = engine.run_now(&request).await?;

    eprintln!(
        "matched {} keys, {} errors, {} skipped",
        outcome.matched_key_count, outcome.error_count, outcome.skipped_key_count
    );
    for point in &outcome.series {
        eprintln!("{} {} {}", point.bucket, point.channel, point.count);
    }

    let document = outcome.table.to_json()?;
    if args.write_file {
        let file_name = export_file_name(&request);
        std::fs::write(&file_name, document)?;
        eprintln!("wrote {file_name}");
    } else {
        println!("{document}");
    }

    store.close().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
