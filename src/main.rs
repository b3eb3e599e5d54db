use clap::{Parser, Subcommand};
use tracing::error;

use oil_price_sync::config::{self, StoreConfig, NYSERDA_CSV_URL};
use oil_price_sync::error::Result;
use oil_price_sync::logging;
use oil_price_sync::pipeline;
use oil_price_sync::store::SupabaseStore;
use oil_price_sync::sync::RunOutcome;

#[derive(Parser)]
#[command(name = "oil-price-sync")]
#[command(about = "Heating-oil price sync jobs (NYSERDA open data, EIA NYMEX spot)")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync regional heating-oil prices from the NYSERDA open-data CSV
    Nyserda {
        /// Override the source CSV URL
        #[arg(long)]
        url: Option<String>,
    },
    /// Sync the latest NYMEX heating-oil spot price from the EIA API
    Nymex,
}

fn report(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Synced(n) => println!("✅ Sync completed successfully! Processed {n} rows"),
        RunOutcome::NoNewData => println!("✨ No new data to sync"),
    }
}

async fn run_nyserda(url: Option<String>) -> Result<RunOutcome> {
    let store = SupabaseStore::new(StoreConfig::from_env()?);
    let client = reqwest::Client::new();
    let url = url.unwrap_or_else(|| NYSERDA_CSV_URL.to_string());
    pipeline::run_nyserda(&store, &client, &url, &config::nyserda_table()).await
}

async fn run_nymex() -> Result<RunOutcome> {
    let store = SupabaseStore::new(StoreConfig::from_env()?);
    let client = reqwest::Client::new();
    let api_key = config::eia_api_key()?;
    pipeline::run_nymex(&store, &client, &api_key, &config::nymex_table()).await
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Nyserda { url } => {
            println!("🛢️  NYSERDA Heating Oil Price Sync");
            match run_nyserda(url).await {
                Ok(outcome) => report(&outcome),
                Err(e) => {
                    // Partial success is acceptable for the bulk job, so a
                    // failed run is logged but does not fail the scheduler.
                    error!("NYSERDA sync failed: {e}");
                    println!("❌ Sync failed: {e}");
                }
            }
        }
        Commands::Nymex => {
            println!("🛢️  NYMEX Heating Oil Price Update (EIA source)");
            match run_nymex().await {
                Ok(outcome) => report(&outcome),
                Err(e) => {
                    error!("NYMEX update failed: {e}");
                    println!("❌ Update failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}
