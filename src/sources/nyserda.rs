use tracing::{info, instrument};

use crate::error::{Result, SyncError};

/// Wide-format table as published by the open-data portal: one row per
/// date, one column per region price series. Column names are not
/// contractually fixed, so the date column is discovered at runtime.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Header words that can stand in for a date column when none of the
/// headers mentions "date" outright.
const FALLBACK_DATE_WORDS: [&str; 5] = ["time", "period", "week", "month", "year"];

/// Resolves which column holds the observation date. Prioritized rules:
/// any header containing "date" wins; otherwise the first header containing
/// a period-like word; otherwise the table shape is unusable.
pub fn detect_date_column(headers: &[String]) -> Result<usize> {
    if let Some(idx) = headers
        .iter()
        .position(|h| h.to_lowercase().contains("date"))
    {
        return Ok(idx);
    }
    if let Some(idx) = headers.iter().position(|h| {
        let lower = h.to_lowercase();
        FALLBACK_DATE_WORDS.iter().any(|w| lower.contains(w))
    }) {
        return Ok(idx);
    }
    Err(SyncError::Schema(format!(
        "no date column could be identified among: {headers:?}"
    )))
}

/// Downloads the NYSERDA heating-oil CSV and parses it into a raw wide
/// table. No retry here: a transient fetch failure aborts the run and the
/// next scheduled run picks the data up instead.
#[instrument(skip(client))]
pub async fn fetch_raw_table(client: &reqwest::Client, url: &str) -> Result<RawTable> {
    info!("Fetching NYSERDA heating oil data");
    let body = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    parse_csv(&body)
}

/// Parses a delimited wide table from a CSV body.
pub fn parse_csv(body: &str) -> Result<RawTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(record.iter().map(|f| f.to_string()).collect());
    }

    info!(
        columns = headers.len(),
        rows = rows.len(),
        "Parsed source table"
    );
    Ok(RawTable { headers, rows })
}
