use std::future::Future;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::config::{EIA_API_URL, EIA_SERIES_ID};
use crate::error::{Result, SyncError};

pub const MAX_ATTEMPTS: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Most recent spot price published for the series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotPrice {
    pub date: NaiveDate,
    pub price: f64,
}

/// Fetches the latest NY Harbor heating-oil spot price from the EIA open
/// data API, retrying transient transport failures up to [`MAX_ATTEMPTS`]
/// with a fixed delay. Auth and payload-shape failures are never retried.
#[instrument(skip(client, api_key))]
pub async fn fetch_latest_spot(client: &reqwest::Client, api_key: &str) -> Result<SpotPrice> {
    retry(MAX_ATTEMPTS, RETRY_DELAY, || fetch_once(client, api_key)).await
}

/// Runs `op` until it succeeds, a non-retryable error surfaces, or
/// `max_attempts` attempts have failed. Sleeps `delay` between attempts.
/// After exhausting the budget the last transport error is reported as
/// [`SyncError::SourceUnavailable`].
pub async fn retry<T, F, Fut>(max_attempts: u32, delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt < max_attempts => {
                warn!(attempt, max_attempts, error = %e, "Attempt failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(SyncError::SourceUnavailable(format!(
                    "all {max_attempts} attempts failed, last error: {e}"
                )));
            }
        }
    }
}

async fn fetch_once(client: &reqwest::Client, api_key: &str) -> Result<SpotPrice> {
    let resp = client
        .get(EIA_API_URL)
        .timeout(REQUEST_TIMEOUT)
        .query(&[
            ("api_key", api_key),
            ("frequency", "daily"),
            ("data[0]", "value"),
            ("facets[series][]", EIA_SERIES_ID),
            ("sort[0][column]", "period"),
            ("sort[0][direction]", "desc"),
            ("length", "1"),
        ])
        .send()
        .await?;

    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SyncError::Auth(format!(
            "EIA API rejected the key with {status}; check EIA_API_KEY"
        )));
    }
    let resp = resp.error_for_status()?;

    // Decode by hand so a malformed body surfaces as a schema problem
    // rather than a retryable transport error.
    let body = resp.text().await?;
    let envelope: Value = serde_json::from_str(&body)?;
    parse_envelope(&envelope)
}

fn parse_envelope(envelope: &Value) -> Result<SpotPrice> {
    let latest = envelope["response"]["data"]
        .as_array()
        .and_then(|data| data.first())
        .ok_or_else(|| SyncError::Schema("no data returned from EIA".to_string()))?;

    // The v2 API has been observed returning `value` as both number and string.
    let price = match &latest["value"] {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| SyncError::Schema("EIA response is missing a numeric 'value'".to_string()))?;

    let period = latest["period"]
        .as_str()
        .ok_or_else(|| SyncError::Schema("EIA response is missing 'period'".to_string()))?;
    let date = NaiveDate::parse_from_str(period, "%Y-%m-%d")
        .map_err(|e| SyncError::Schema(format!("unparseable period '{period}': {e}")))?;

    info!(%date, price, "Fetched spot price from EIA");
    Ok(SpotPrice { date, price })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_recovers_from_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result = retry(3, Duration::ZERO, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(SyncError::SourceUnavailable(format!("attempt {n} down")))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_budget() {
        let attempts = AtomicU32::new(0);
        let result: Result<()> = retry(3, Duration::ZERO, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::SourceUnavailable("still down".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(SyncError::SourceUnavailable(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_errors_fail_fast() {
        let attempts = AtomicU32::new(0);
        let result: Result<()> = retry(3, Duration::ZERO, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::Auth("bad key".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(SyncError::Auth(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn schema_errors_fail_fast() {
        let attempts = AtomicU32::new(0);
        let result: Result<()> = retry(3, Duration::ZERO, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(SyncError::Schema("no data".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(SyncError::Schema(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn parses_eia_envelope() {
        let envelope = json!({
            "response": {
                "data": [{"period": "2024-01-15", "value": 2.6789}]
            }
        });
        let spot = parse_envelope(&envelope).unwrap();
        assert_eq!(spot.date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert!((spot.price - 2.6789).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_stringly_typed_value() {
        let envelope = json!({
            "response": {
                "data": [{"period": "2024-01-15", "value": "2.68"}]
            }
        });
        assert!((parse_envelope(&envelope).unwrap().price - 2.68).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_data_array_is_a_schema_error() {
        let envelope = json!({"response": {"data": []}});
        assert!(matches!(
            parse_envelope(&envelope),
            Err(SyncError::Schema(_))
        ));
    }
}
