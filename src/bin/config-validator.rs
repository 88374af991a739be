//! # Publisher Configuration Validator
//!
//! Command-line tool that loads a publisher configuration the same way the
//! library does (TOML file + environment overrides) and reports whether it is
//! valid before a service starts publishing with it.

use anyhow::Context;
use clap::{Parser, Subcommand};
use pubsub_publisher::config::loader::DEFAULT_ENV_PREFIX;
use pubsub_publisher::{ConfigLoader, PublisherConfig, SERVER_PUBLISH_MAX_BYTES};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate publisher configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// TOML configuration file (defaults are used when omitted)
    #[arg(short, long, env = "PUBSUB_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Prefix for environment variable overrides
    #[arg(long, default_value = DEFAULT_ENV_PREFIX)]
    env_prefix: String,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format (table, json)
    #[arg(long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the configuration
    Validate,

    /// Print the effective configuration after overrides
    Show,

    /// Print the built-in defaults
    Defaults,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::Validate) | None => validate(&cli),
        Some(Commands::Show) => load(&cli).and_then(|config| print_config(&cli, &config)),
        Some(Commands::Defaults) => print_config(&cli, &PublisherConfig::default()),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {:#}", e);
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> anyhow::Result<PublisherConfig> {
    let mut loader = ConfigLoader::new().with_env_prefix(&cli.env_prefix);
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    loader
        .load()
        .with_context(|| format!("loading configuration with prefix {}", cli.env_prefix))
}

fn validate(cli: &Cli) -> anyhow::Result<()> {
    println!("🔧 Validating publisher configuration");
    match &cli.config {
        Some(path) => println!("File: {}", path.display()),
        None => println!("File: <none, defaults + environment>"),
    }
    println!("Environment prefix: {}", cli.env_prefix);
    println!();

    let config = match load(cli) {
        Ok(config) => {
            println!("✅ Configuration loaded and validated");
            config
        }
        Err(e) => {
            println!("❌ {e:#}");
            return Err(e);
        }
    };

    if config.batch.max_bytes > SERVER_PUBLISH_MAX_BYTES {
        println!(
            "⚠️  batch.max_bytes ({}) exceeds the server ceiling; {} will be used",
            config.batch.max_bytes,
            config.batch.effective_max_bytes()
        );
    }

    print_config(cli, &config)
}

fn print_config(cli: &Cli, config: &PublisherConfig) -> anyhow::Result<()> {
    match cli.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(config)?),
        "table" => {
            println!("📋 Batch");
            println!("  max_messages:        {}", config.batch.max_messages);
            println!("  max_bytes:           {}", config.batch.max_bytes);
            println!("  max_latency_ms:      {}", config.batch.max_latency_ms);
            println!("📋 Retry");
            println!("  initial_backoff_ms:  {}", config.retry.initial_backoff_ms);
            println!("  max_backoff_ms:      {}", config.retry.max_backoff_ms);
            println!("  backoff_multiplier:  {}", config.retry.backoff_multiplier);
            println!("  deadline_ms:         {}", config.retry.deadline_ms);
            println!("  timeout_ms:          {}", config.retry.timeout_ms);
        }
        other => anyhow::bail!("Unknown output format: {other}"),
    }
    Ok(())
}
