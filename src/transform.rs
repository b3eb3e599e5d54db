use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::sources::eia::SpotPrice;
use crate::sources::nyserda::RawTable;

/// One regional retail price reading. Natural key is (date, region_name).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceObservation {
    pub date: NaiveDate,
    pub region_name: String,
    pub price: f64,
}

/// One daily NYMEX spot quote with its movement against the previously
/// persisted quote. Natural key is the date.
#[derive(Debug, Clone, Serialize)]
pub struct NymexQuote {
    pub date: NaiveDate,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub updated_at: DateTime<Utc>,
}

/// Unit suffix the open-data portal appends to its price column names.
static UNIT_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*\(\$/gal\)").unwrap());

/// Date renderings seen in the feed over time.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y"];

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn clean_region_name(header: &str) -> String {
    UNIT_SUFFIX.replace_all(header, "").trim().to_string()
}

/// Melts the wide source table into one `PriceObservation` per
/// (date, region), keeping only rows strictly newer than the watermark.
/// Rows with unparseable dates and cells with null prices are dropped; an
/// absent watermark means a first run that ingests the full history.
pub fn melt_observations(
    table: &RawTable,
    date_col: usize,
    watermark: Option<NaiveDate>,
) -> Vec<PriceObservation> {
    let price_cols: Vec<usize> = table
        .headers
        .iter()
        .enumerate()
        .filter(|(idx, name)| *idx != date_col && name.to_lowercase().contains("average"))
        .map(|(idx, _)| idx)
        .collect();
    debug!(price_columns = price_cols.len(), "Identified price columns");

    let mut observations = Vec::new();
    let mut total_rows = 0usize;
    for row in &table.rows {
        let Some(date) = row.get(date_col).and_then(|raw| parse_date(raw)) else {
            continue;
        };
        total_rows += 1;
        if let Some(w) = watermark {
            if date <= w {
                continue;
            }
        }
        for &col in &price_cols {
            let Some(price) = row.get(col).and_then(|raw| raw.trim().parse::<f64>().ok())
            else {
                continue;
            };
            observations.push(PriceObservation {
                date,
                region_name: clean_region_name(&table.headers[col]),
                price: round2(price),
            });
        }
    }

    info!(
        new_rows = observations.len(),
        source_rows = total_rows,
        "Filtered and reshaped source table"
    );
    observations
}

/// Price movement against the previous persisted price, both parts rounded
/// to 2 decimals. An absent or zero previous price yields (0, 0) rather
/// than dividing by zero.
pub fn calculate_change(current: f64, previous: Option<f64>) -> (f64, f64) {
    match previous {
        None => (0.0, 0.0),
        Some(p) if p == 0.0 => (0.0, 0.0),
        Some(p) => {
            let change = current - p;
            (round2(change), round2(change / p * 100.0))
        }
    }
}

impl PriceObservation {
    pub fn to_row(&self) -> Map<String, Value> {
        let mut row = Map::new();
        row.insert("date".into(), json!(self.date.format("%Y-%m-%d").to_string()));
        row.insert("region_name".into(), json!(self.region_name));
        row.insert("price".into(), json!(self.price));
        row
    }
}

impl NymexQuote {
    /// Stamps a fetched spot price with its movement and a capture time.
    pub fn capture(spot: SpotPrice, previous: Option<f64>) -> Self {
        let price = round2(spot.price);
        let (change, change_percent) = calculate_change(price, previous);
        Self {
            date: spot.date,
            price,
            change,
            change_percent,
            updated_at: Utc::now(),
        }
    }

    pub fn to_row(&self) -> Map<String, Value> {
        let mut row = Map::new();
        row.insert("date".into(), json!(self.date.format("%Y-%m-%d").to_string()));
        row.insert("price".into(), json!(self.price));
        row.insert("change".into(), json!(self.change));
        row.insert("change_percent".into(), json!(self.change_percent));
        row.insert("updated_at".into(), json!(self.updated_at.to_rfc3339()));
        row
    }
}
