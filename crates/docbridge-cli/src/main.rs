//! docbridge CLI - command-line host for the MongoDB exports
//!
//! Usage:
//!   docbridge exports                                  List export names
//!   docbridge status                                   Connect and print the connection status
//!   docbridge call find '{"collection":"players"}'     Call an export, print the result tuple
//!   docbridge call update '{"collection":"c","query":{"a":1},"update":{"$set":{"a":9}}}' false
//!   docbridge call collectionExists players
//!
//! Connection settings come from the MONGODB_URL / MONGODB_DATABASE
//! environment variables; --url / --database override them.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use docbridge_mongodb::{ExportHost, Facade, PoolConfig, RejectionPolicy, Settings, EXPORTS};

#[derive(Parser)]
#[command(name = "docbridge")]
#[command(about = "Call docbridge MongoDB exports from the command line", long_about = None)]
#[command(version)]
struct Cli {
    /// MongoDB connection URL (overrides MONGODB_URL)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Database name (overrides MONGODB_DATABASE)
    #[arg(long, global = true)]
    database: Option<String>,

    /// Maximum number of pooled connections
    #[arg(long, global = true)]
    max_pool_size: Option<u32>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the export names
    Exports,
    /// Connect and print the connection status
    Status,
    /// Call an export and print its result tuple as JSON
    Call {
        /// Export name (find, insertOne, update, ...)
        export: String,

        /// Positional arguments; JSON values, anything else is taken as a string
        args: Vec<String>,

        /// Print (false, message) for calls rejected before reaching the database
        #[arg(long)]
        report_rejections: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let settings = settings(&cli);

    match cli.command {
        Commands::Exports => {
            for name in EXPORTS {
                println!("{}", name);
            }
            Ok(())
        }
        Commands::Status => {
            let facade = connect(settings).await?;
            println!("{}", facade.status());
            Ok(())
        }
        Commands::Call {
            export,
            args,
            report_rejections,
        } => {
            let args = parse_args(&args);
            let facade = connect(settings).await?;

            let policy = if report_rejections {
                RejectionPolicy::Report
            } else {
                RejectionPolicy::Silent
            };
            let host = ExportHost::new(facade).with_policy(policy);

            match host.call(&export, &args, None).await? {
                Some(tuple) => {
                    println!("{}", serde_json::to_string_pretty(&tuple.to_value())?);
                    Ok(())
                }
                None => bail!("'{}' returned nothing; the call was rejected before reaching the database", export),
            }
        }
    }
}

/// Environment settings with command-line overrides applied
fn settings(cli: &Cli) -> Settings {
    let mut settings = Settings::from_env();
    if let Some(url) = &cli.url {
        settings.url = url.clone();
    }
    if let Some(database) = &cli.database {
        settings.database = database.clone();
    }
    if let Some(max) = cli.max_pool_size {
        settings = settings.with_pool(PoolConfig {
            max_pool_size: Some(max),
            ..PoolConfig::default()
        });
    }
    settings
}

/// Bootstrap a facade and wait for the connection attempt to settle
async fn connect(settings: Settings) -> Result<Arc<Facade>> {
    let facade = Arc::new(Facade::new());
    let mut events = facade.subscribe();

    if let Some(handle) = facade.bootstrap(settings) {
        handle.await.context("Connection task failed")?;
    }

    if let Ok(event) = events.try_recv() {
        info!("{} fired", event.name());
    }

    Ok(facade)
}

fn parse_args(raw: &[String]) -> Vec<Value> {
    raw.iter()
        .map(|arg| serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.clone())))
        .collect()
}

/// Initialize logging based on log level
fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .ok(); // Ignore error if already initialized
}
