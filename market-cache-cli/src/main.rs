use std::path::PathBuf;
use clap::{Parser, Subcommand};
use anyhow::Result;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use market_cache::{CacheConfig, DataKind, MarketDataCache, MetadataRead, Payload};
use market_cache_cli::{
    collect_params, read_payload, render_event, render_gate_status, render_policies,
    render_stats, ttl_from_hours, PayloadFormat,
};

#[derive(Parser)]
#[command(name = "market-cache")]
#[command(about = "Inspect and maintain the market data cache", long_about = None)]
struct Cli {
    /// Cache root (overrides MARKET_CACHE_DIR)
    #[arg(short, long)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show entry counts and disk usage
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Store a payload read from a file or stdin
    Save {
        /// Data kind (quote_series, news, fundamentals or a custom label)
        kind: String,

        /// Ticker or exchange code
        subject: String,

        /// Upstream provider name
        #[arg(short, long, default_value = "manual")]
        source: String,

        /// Query parameter as name=value (repeatable)
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Input file ("-" or omitted for stdin)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// How to interpret the input
        #[arg(long, value_enum, default_value = "text")]
        format: PayloadFormat,
    },

    /// Print a cached payload
    Load {
        /// Cache key
        key: String,
    },

    /// Find a fresh entry for a subject
    Find {
        /// Data kind
        kind: String,

        /// Ticker or exchange code
        subject: String,

        /// Restrict to one provider
        #[arg(short, long)]
        source: Option<String>,

        /// Query parameter as name=value (repeatable)
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Override the partition TTL
        #[arg(long)]
        ttl_hours: Option<u64>,
    },

    /// Show the metadata record of a key
    Inspect {
        /// Cache key
        key: String,
    },

    /// Delete one entry
    Invalidate {
        /// Cache key
        key: String,
    },

    /// Remove entries older than a number of days
    Evict {
        #[arg(short, long, default_value = "7")]
        days: u64,
    },

    /// Bring partitions back under their file limits
    Trim,

    /// Show the freshness policy table
    Policies,

    /// Show size gate configuration and provider detection
    GateStatus,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "market_cache=info".into())
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = CacheConfig::from_env()?;
    if let Some(dir) = &cli.cache_dir {
        config.root_dir = dir.clone();
    }
    debug!("Cache config: {:?}", config);
    let cache = MarketDataCache::new(config)?;

    match cli.command {
        Commands::Stats { json } => {
            let stats = cache.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print!("{}", render_stats(&stats));
            }
        }

        Commands::Save { ref kind, ref subject, ref source, ref params, ref file, format } => {
            let payload = read_payload(file.as_deref(), format)?;
            let params = collect_params(params)?;
            let key = cache.save(&DataKind::parse(kind), subject, &payload, source, &params)?;

            let skipped = cache
                .metadata(&key)
                .found()
                .map(|record| record.skipped)
                .unwrap_or(false);
            if skipped {
                println!("{} (skipped: content too long)", key);
            } else {
                println!("{}", key);
            }
        }

        Commands::Load { ref key } => match cache.load(key) {
            Some(Payload::Text(text)) => print!("{}", text),
            Some(Payload::Tabular(table)) => print!("{}", table.to_csv()?),
            None => {
                eprintln!("No cached payload for {}", key);
                std::process::exit(1);
            }
        },

        Commands::Find { ref kind, ref subject, ref source, ref params, ttl_hours } => {
            let params = collect_params(params)?;
            let ttl = ttl_hours.map(ttl_from_hours);

            match cache.find(&DataKind::parse(kind), subject, source.as_deref(), &params, ttl) {
                Some(key) => println!("{}", key),
                None => {
                    eprintln!("No fresh {} entry for {}", kind, subject);
                    std::process::exit(1);
                }
            }
        }

        Commands::Inspect { ref key } => match cache.metadata(key) {
            MetadataRead::Found(record) => {
                println!("{}", serde_json::to_string_pretty(&record)?);
                let fresh = cache.is_fresh(key, None);
                println!("Fresh: {}", if fresh { "yes" } else { "no" });
            }
            MetadataRead::NotFound => {
                eprintln!("No metadata for {}", key);
                std::process::exit(1);
            }
            MetadataRead::Corrupt(reason) => {
                eprintln!("Metadata for {} is unreadable: {}", key, reason);
                std::process::exit(1);
            }
        },

        Commands::Invalidate { ref key } => match cache.invalidate(key)? {
            Some(event) => println!("{}", render_event(&event)),
            None => println!("Nothing cached under {}", key),
        },

        Commands::Evict { days } => {
            let event = cache.evict_older_than(days);
            println!("{}", render_event(&event));
        }

        Commands::Trim => {
            let events = cache.trim_to_policy_limits();
            if events.is_empty() {
                println!("All partitions within limits");
            }
            for event in events {
                println!("{}", render_event(&event));
            }
        }

        Commands::Policies => {
            print!("{}", render_policies(cache.policies()));
        }

        Commands::GateStatus => {
            print!("{}", render_gate_status(&cache.gate_status()));
        }
    }

    Ok(())
}
