use chrono::NaiveDate;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::sources::{eia, nyserda};
use crate::store::PriceStore;
use crate::sync::{sync_batches, RunOutcome, BULK_BATCH_SIZE};
use crate::transform::{melt_observations, parse_date, NymexQuote};

/// Runs the bulk NYSERDA sync: fetch the wide CSV, melt it to one row per
/// (date, region), drop everything at or below the persisted watermark and
/// upsert the remainder in batches.
#[instrument(skip(store, client))]
pub async fn run_nyserda(
    store: &dyn PriceStore,
    client: &reqwest::Client,
    url: &str,
    table: &str,
) -> Result<RunOutcome> {
    let raw = nyserda::fetch_raw_table(client, url).await?;
    let date_col = nyserda::detect_date_column(&raw.headers)?;
    info!(date_column = %raw.headers[date_col], "Resolved date column");

    let watermark = latest_date(store, table).await;
    match watermark {
        Some(w) => info!(watermark = %w, "Latest date in store"),
        None => info!("No existing data in store, ingesting full history"),
    }

    let observations = melt_observations(&raw, date_col, watermark);
    if observations.is_empty() {
        return Ok(RunOutcome::NoNewData);
    }

    let rows: Vec<_> = observations.iter().map(|o| o.to_row()).collect();
    let processed = sync_batches(store, table, &rows, "date,region_name", BULK_BATCH_SIZE).await;
    Ok(RunOutcome::Synced(processed))
}

/// Runs the single-record NYMEX sync: read the previous persisted price,
/// fetch the latest spot quote from EIA, stamp it with its movement and
/// upsert the one row. Any write failure here is fatal, there is no
/// partial-success state for a single record.
#[instrument(skip(store, client, api_key))]
pub async fn run_nymex(
    store: &dyn PriceStore,
    client: &reqwest::Client,
    api_key: &str,
    table: &str,
) -> Result<RunOutcome> {
    let previous = latest_price(store, table).await;
    match previous {
        Some(p) => info!(previous_price = p, "Latest price in store"),
        None => info!("No existing data in store"),
    }

    let spot = eia::fetch_latest_spot(client, api_key).await?;
    let quote = NymexQuote::capture(spot, previous);
    info!(
        date = %quote.date,
        price = quote.price,
        change = quote.change,
        change_percent = quote.change_percent,
        "Captured quote"
    );

    store.upsert(table, &[quote.to_row()], "date").await?;
    Ok(RunOutcome::Synced(1))
}

/// Watermark snapshot for the bulk pipeline. A failed read is treated as an
/// empty store: the worst case is re-upserting rows that already exist,
/// which the natural-key upsert absorbs.
async fn latest_date(store: &dyn PriceStore, table: &str) -> Option<NaiveDate> {
    match store.latest_row(table, "date").await {
        Ok(Some(row)) => row.get("date").and_then(Value::as_str).and_then(parse_date),
        Ok(None) => None,
        Err(e) => {
            warn!(table, error = %e, "Could not read watermark, assuming empty store");
            None
        }
    }
}

/// Previous persisted price for the change calculation. Same policy as the
/// watermark read: a failed or empty read degrades to "no previous price".
async fn latest_price(store: &dyn PriceStore, table: &str) -> Option<f64> {
    match store.latest_row(table, "date,price").await {
        Ok(Some(row)) => match row.get("price") {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        },
        Ok(None) => None,
        Err(e) => {
            warn!(table, error = %e, "Could not read previous price");
            None
        }
    }
}
