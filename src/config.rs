use std::env;

use crate::error::{Result, SyncError};

pub const NYSERDA_CSV_URL: &str =
    "https://data.ny.gov/api/views/rc94-5y2u/rows.csv?accessType=DOWNLOAD";

/// EIA series ID for NY Harbor Heating Oil Spot Price FOB ($/gal).
pub const EIA_SERIES_ID: &str = "PET.EER_EPLLPA_PF4_Y35NY_DPG.D";
pub const EIA_API_URL: &str = "https://api.eia.gov/v2/petroleum/pri/spt/data/";

/// Store connection settings shared by both pipelines, read from the
/// process environment (a `.env` file is honored via dotenv).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    pub service_key: String,
}

impl StoreConfig {
    pub fn from_env() -> Result<Self> {
        let url = require_var("SUPABASE_URL")?;
        let service_key = require_var("SUPABASE_SERVICE_KEY")?;
        Ok(Self { url, service_key })
    }
}

/// Table the NYSERDA pipeline writes to; overridable for staging runs.
pub fn nyserda_table() -> String {
    env::var("NYSERDA_TABLE").unwrap_or_else(|_| "heating_oil_prices".to_string())
}

/// Table the NYMEX pipeline writes to.
pub fn nymex_table() -> String {
    env::var("NYMEX_TABLE").unwrap_or_else(|_| "nymex_prices".to_string())
}

pub fn eia_api_key() -> Result<String> {
    require_var("EIA_API_KEY")
}

fn require_var(name: &str) -> Result<String> {
    env::var(name)
        .map_err(|_| SyncError::Config(format!("{name} environment variable not set")))
}
