//! certsync - keeps declared domains supplied with TLS certificates
//!
//! Issues certificates through ACME DNS-01 and pushes them to CDN and
//! object-storage custom domains, once or on a cron schedule.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::{CertsCommand, CheckCommand, Paths, RunCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "CERTSYNC_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "CERTSYNC_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(flatten)]
    paths: Paths,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile every declared domain, once or on a cron schedule
    Run(RunCommand),
    /// Validate and normalize the config file
    Check(CheckCommand),
    /// List stored certificates and their renewal status
    Certs(CertsCommand),
}

fn init_tracing(log_level: &str, log_format: &str) -> anyhow::Result<()> {
    // RUST_LOG takes full control when set
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .context("Invalid RUST_LOG environment variable")?
    } else {
        tracing_subscriber::EnvFilter::try_new(format!(
            "certsync={level},\
             certsync_core={level},\
             certsync_dns={level},\
             certsync_tls={level},\
             certsync_cdn={level},\
             certsync_storage={level},\
             certsync_runner={level},\
             instant_acme=warn,\
             hickory_resolver=warn,\
             hickory_proto=warn,\
             h2=warn,\
             hyper=warn,\
             reqwest=warn,\
             rustls=warn",
            level = log_level
        ))
        .with_context(|| format!("Invalid log level '{}'", log_level))?
    };

    let fmt_layer = match log_format {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, &cli.log_format)?;

    match cli.command {
        Commands::Run(cmd) => cmd.execute(&cli.paths),
        Commands::Check(cmd) => cmd.execute(&cli.paths),
        Commands::Certs(cmd) => cmd.execute(&cli.paths),
    }
}
