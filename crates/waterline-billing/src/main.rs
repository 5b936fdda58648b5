use anyhow::Result;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;
use tracing::info;
use waterline_billing::config::BillingConfig;
use waterline_billing::storage::DatabasePool;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "waterline-billing")]
#[command(about = "Waterline Billing - water utility billing administration")]
struct Args {
    #[arg(short, long, help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Generate sample configuration file")]
    gen_config: bool,

    #[arg(long, help = "Dry run mode (validate config without touching the database)")]
    dry_run: bool,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    waterline_common::logging::init_logging(&args.verbosity, "waterline_billing=info")?;

    if args.gen_config {
        let config = BillingConfig::default();
        let toml = toml::to_string_pretty(&config)?;
        println!("{}", toml);
        return Ok(());
    }

    let config = BillingConfig::load(args.config)?;

    info!("Starting Waterline Billing");
    info!("Environment: {}", config.service.environment);
    info!("Service ID: {}", config.service.service_id);

    if args.dry_run {
        info!("Configuration validated successfully (dry-run mode)");
        return Ok(());
    }

    let db = DatabasePool::connect(&config.database).await?;
    db.run_migrations().await?;

    info!("Waterline Billing database is ready");
    Ok(())
}
