//! normcache - Normalized GraphQL response cache
//!
//! Main entry point for the normcache CLI. Operations are read from JSON
//! descriptors and responses from JSON `data` objects.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use normcache::config::{validate_config_result, BackendKind, CacheConfig};
use normcache::gql_operation::Operation;
use normcache::storage::{encode_record, StoreStats};
use normcache::NormalizedCache;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process;

/// normcache - Normalized GraphQL response cache
#[derive(Parser, Debug)]
#[command(name = "normcache")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/normcache/config.yaml)
    #[arg(short, long, env = "NORMCACHE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize normcache configuration
    Init {
        /// Storage backend to configure
        #[arg(short, long, value_enum, default_value = "sqlite")]
        backend: BackendArg,

        /// SQLite database path (default: ~/.config/normcache/cache.db)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Normalize a response and merge it into the cache
    Write {
        /// Operation descriptor (JSON)
        #[arg(short, long)]
        operation: PathBuf,

        /// Response `data` object (JSON)
        #[arg(short, long)]
        data: PathBuf,
    },

    /// Reconstruct an operation's response from the cache
    Read {
        /// Operation descriptor (JSON)
        #[arg(short, long)]
        operation: PathBuf,

        /// Start at this record instead of the operation root
        #[arg(long)]
        root: Option<String>,
    },

    /// Print stored records
    Dump {
        /// Only this record
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Show store statistics
    Stats,

    /// Print Prometheus metrics gathered while touching the store
    Metrics,

    /// Remove a record
    Remove {
        /// Record key (e.g., Droid.2001)
        key: String,

        /// Also remove records only reachable through this one
        #[arg(long)]
        cascade: bool,
    },

    /// Remove every record from every tier
    Clear,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendArg {
    Memory,
    Sqlite,
    TwoTier,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Memory => BackendKind::Memory,
            BackendArg::Sqlite => BackendKind::Sqlite,
            BackendArg::TwoTier => BackendKind::TwoTier,
        }
    }
}

fn main() {
    // Initialize logging
    if let Err(e) = normcache::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(CacheConfig::default_path);

    match cli.command {
        Commands::Init { backend, db } => {
            handle_init_command(&config_path, backend.into(), db)?;
        }

        Commands::Write { operation, data } => {
            let cache = open_cache(&config_path)?;
            let operation = load_operation(&operation)?;
            let data = load_json(&data)?;
            let data = data.get("data").cloned().unwrap_or(data);

            let changed = match cache.normalize_and_merge(&operation, &data) {
                Ok(changed) => changed,
                Err(e) if e.is_degraded() => {
                    eprintln!("⚠️  {}", e);
                    e.changed_keys().cloned().unwrap_or_default()
                }
                Err(e) => return Err(e.into()),
            };

            let mut changed: Vec<_> = changed.iter().map(|f| f.to_string()).collect();
            changed.sort();
            println!("✓ Merged {} ({} changed fields)", operation.name, changed.len());
            for field in changed {
                println!("  {}", field);
            }
        }

        Commands::Read { operation, root } => {
            let cache = open_cache(&config_path)?;
            let operation = load_operation(&operation)?;
            let data = match root {
                Some(root) => cache.read_from(&operation, &root)?,
                None => cache.read(&operation)?,
            };
            println!("{}", serde_json::to_string_pretty(&data)?);
        }

        Commands::Dump { key } => {
            let cache = open_cache(&config_path)?;
            let records = cache.dump()?;
            match key {
                Some(key) => {
                    let record = records
                        .get(&key)
                        .with_context(|| format!("No record with key {}", key))?;
                    println!("{}", encode_record(record));
                }
                None => {
                    println!("{} records:", records.len());
                    println!();
                    for (key, record) in &records {
                        println!("{}  {}", key, encode_record(record));
                    }
                }
            }
        }

        Commands::Stats => {
            let cache = open_cache(&config_path)?;
            let stats = cache.stats()?;
            print_stats(&stats, 0);
        }

        Commands::Metrics => {
            let cache = open_cache(&config_path)?;
            let stats = cache.stats()?;
            normcache::metrics::set_resident_entries(&stats.backend, stats.entries);
            print!("{}", normcache::metrics::encode_metrics());
        }

        Commands::Remove { key, cascade } => {
            let cache = open_cache(&config_path)?;
            if cache.remove(&key, cascade)? {
                println!("✓ Removed {}{}", key, if cascade { " (cascade)" } else { "" });
            } else {
                println!("No record with key {}", key);
            }
        }

        Commands::Clear => {
            let cache = open_cache(&config_path)?;
            cache.clear_all()?;
            println!("✓ Cache cleared");
        }
    }

    Ok(())
}

/// Load, validate and build the configured cache
fn open_cache(config_path: &Path) -> anyhow::Result<NormalizedCache> {
    let config = match CacheConfig::load(config_path) {
        Ok(config) => config,
        Err(normcache::NormCacheError::Config(msg)) if msg.contains("Config file not found") => {
            anyhow::bail!(
                "No configuration found at {}. Run 'normcache init' first to create one.",
                config_path.display()
            );
        }
        Err(e) => return Err(e.into()),
    };
    validate_config_result(&config)?;

    if config.backend == BackendKind::Memory {
        tracing::warn!("Memory backend does not persist between invocations");
    }

    let cache = config.build_cache()?;
    tracing::info!(backend = ?config.backend, "Cache opened");
    Ok(cache)
}

fn handle_init_command(config_file: &Path, backend: BackendKind, db: Option<PathBuf>) -> anyhow::Result<()> {
    // Check if already initialized
    if config_file.exists() {
        println!("Configuration already exists at {}", config_file.display());
        return Ok(());
    }

    let mut config = CacheConfig::new();
    config.backend = backend;
    if let Some(db) = db {
        config.sqlite.path = db;
    }
    config
        .save(config_file)
        .with_context(|| format!("Failed to write {}", config_file.display()))?;

    println!("✓ Created configuration at {}", config_file.display());
    println!();
    println!("Next steps:");
    println!("  normcache write --operation op.json --data response.json");
    println!("  normcache read --operation op.json");

    Ok(())
}

fn load_operation(path: &Path) -> anyhow::Result<Operation> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Operation::from_json_str(&text).with_context(|| format!("Invalid operation descriptor {}", path.display()))
}

fn load_json(path: &Path) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_stats(stats: &StoreStats, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{}Backend:   {}", indent, stats.backend);
    println!("{}Entries:   {}", indent, stats.entries);
    println!("{}Weight:    {} bytes", indent, stats.weight_bytes);
    println!(
        "{}Hits:      {} / misses {} ({:.1}%)",
        indent,
        stats.hits,
        stats.misses,
        stats.hit_rate() * 100.0
    );
    println!("{}Evictions: {}", indent, stats.evictions);
    if let Some(secondary) = &stats.secondary {
        println!("{}Secondary:", indent);
        print_stats(secondary, depth + 1);
    }
}
