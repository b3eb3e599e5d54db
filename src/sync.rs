use serde_json::{Map, Value};
use tracing::{error, info};

use crate::store::PriceStore;

/// Batch size for the bulk CSV pipeline. The single-record price pipeline
/// writes one row directly and skips the batching layer entirely.
pub const BULK_BATCH_SIZE: usize = 500;

/// Terminal state of a successful run; a failed run carries its
/// `SyncError` instead.
#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Synced(usize),
    NoNewData,
}

/// Upserts `rows` into `table` in fixed-size batches. A failing batch is
/// logged and skipped; the remaining batches still go through, so a run
/// delivers as many rows as the store will take rather than all-or-nothing.
/// Returns the number of rows successfully processed.
pub async fn sync_batches(
    store: &dyn PriceStore,
    table: &str,
    rows: &[Map<String, Value>],
    on_conflict: &str,
    batch_size: usize,
) -> usize {
    let mut processed = 0;
    let batch_count = rows.len().div_ceil(batch_size);
    info!(table, rows = rows.len(), batch_count, "Starting batched upsert");

    for (batch_num, batch) in rows.chunks(batch_size).enumerate() {
        match store.upsert(table, batch, on_conflict).await {
            Ok(applied) => {
                processed += applied;
                info!(
                    batch = batch_num + 1,
                    batch_count,
                    applied,
                    processed,
                    "Batch upserted"
                );
            }
            Err(e) => {
                error!(batch = batch_num + 1, batch_count, error = %e, "Batch failed, continuing");
            }
        }
    }

    processed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SyncError};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory stand-in for the hosted store, keyed like the real table.
    struct MockStore {
        rows: Mutex<HashMap<String, Map<String, Value>>>,
        batch_sizes: Mutex<Vec<usize>>,
        fail_on_batch: Option<usize>,
    }

    impl MockStore {
        fn new() -> Self {
            Self {
                rows: Mutex::new(HashMap::new()),
                batch_sizes: Mutex::new(Vec::new()),
                fail_on_batch: None,
            }
        }

        fn failing_on(batch: usize) -> Self {
            Self {
                fail_on_batch: Some(batch),
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl PriceStore for MockStore {
        async fn latest_row(
            &self,
            _table: &str,
            _columns: &str,
        ) -> Result<Option<Map<String, Value>>> {
            Ok(None)
        }

        async fn upsert(
            &self,
            _table: &str,
            rows: &[Map<String, Value>],
            on_conflict: &str,
        ) -> Result<usize> {
            let batch_num = {
                let mut sizes = self.batch_sizes.lock().unwrap();
                sizes.push(rows.len());
                sizes.len()
            };
            if self.fail_on_batch == Some(batch_num) {
                return Err(SyncError::Write("injected batch failure".to_string()));
            }
            let mut stored = self.rows.lock().unwrap();
            for row in rows {
                let key = on_conflict
                    .split(',')
                    .map(|col| row[col].to_string())
                    .collect::<Vec<_>>()
                    .join("|");
                stored.insert(key, row.clone());
            }
            Ok(rows.len())
        }
    }

    fn rows(n: usize) -> Vec<Map<String, Value>> {
        (0..n)
            .map(|i| {
                let mut row = Map::new();
                row.insert("date".into(), json!(format!("2024-01-{:02}", i % 28 + 1)));
                row.insert("region_name".into(), json!(format!("Region {i}")));
                row.insert("price".into(), json!(3.5));
                row
            })
            .collect()
    }

    #[tokio::test]
    async fn partitions_into_fixed_size_batches() {
        let store = MockStore::new();
        let processed = sync_batches(&store, "t", &rows(1200), "date,region_name", 500).await;

        assert_eq!(processed, 1200);
        assert_eq!(*store.batch_sizes.lock().unwrap(), vec![500, 500, 200]);
    }

    #[tokio::test]
    async fn failed_batch_is_skipped_not_fatal() {
        let store = MockStore::failing_on(2);
        let processed = sync_batches(&store, "t", &rows(1200), "date,region_name", 500).await;

        // middle batch lost, the rest delivered
        assert_eq!(processed, 700);
        assert_eq!(store.batch_sizes.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_natural_key() {
        let store = MockStore::new();
        let batch = rows(10);

        sync_batches(&store, "t", &batch, "date,region_name", 500).await;
        let after_first = store.rows.lock().unwrap().len();
        sync_batches(&store, "t", &batch, "date,region_name", 500).await;
        let after_second = store.rows.lock().unwrap().len();

        assert_eq!(after_first, 10);
        assert_eq!(after_second, after_first);
    }
}
