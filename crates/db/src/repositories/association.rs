use std::time::Duration;

use sqlx::{sqlite::SqliteRow, Row};
use tracing::warn;

use basketry_core::chrono::{DateTime, Utc};
use basketry_core::domain::association::{Association, ScoredPair};

use super::{
    pair_from_columns, parse_timestamp, AssociationStore, RangePairCount, RepositoryError,
    WriteOutcome,
};
use crate::DbPool;

const UPSERT_REPLACE: &str = "INSERT INTO product_associations (
        product_a_id,
        product_b_id,
        frequency_count,
        last_calculated
     ) VALUES (?, ?, ?, ?)
     ON CONFLICT (product_a_id, product_b_id) DO UPDATE SET
        frequency_count = excluded.frequency_count,
        last_calculated = excluded.last_calculated";

const UPSERT_ADD: &str = "INSERT INTO product_associations (
        product_a_id,
        product_b_id,
        frequency_count,
        last_calculated
     ) VALUES (?, ?, ?, ?)
     ON CONFLICT (product_a_id, product_b_id) DO UPDATE SET
        frequency_count = product_associations.frequency_count + excluded.frequency_count,
        last_calculated = excluded.last_calculated";

/// Four-column insert payload shared by both upsert flavors.
struct UpsertRow {
    product_a_id: i64,
    product_b_id: i64,
    frequency: i64,
    last_calculated: String,
}

pub struct SqlAssociationStore {
    pool: DbPool,
    batch_size: usize,
    retry_limit: u32,
}

impl SqlAssociationStore {
    pub fn new(pool: DbPool, batch_size: usize, retry_limit: u32) -> Self {
        Self { pool, batch_size: batch_size.max(1), retry_limit }
    }

    /// Writes rows in chunks, one transaction per chunk. A chunk that keeps
    /// failing after the transient-retry budget is skipped, never rolling
    /// back chunks committed before it.
    async fn write_chunked(
        &self,
        sql: &str,
        rows: Vec<UpsertRow>,
    ) -> Result<WriteOutcome, RepositoryError> {
        let mut outcome = WriteOutcome::default();

        for chunk in rows.chunks(self.batch_size) {
            match self.write_chunk_with_retry(sql, chunk).await {
                Ok(written) => {
                    outcome.batches_committed += 1;
                    outcome.rows_written += written;
                }
                Err(error) => {
                    warn!(
                        event_name = "association_store.batch_skipped",
                        rows = chunk.len(),
                        error = %error,
                        "skipping association batch after retry exhaustion"
                    );
                    outcome.batches_failed += 1;
                }
            }
        }

        Ok(outcome)
    }

    async fn write_chunk_with_retry(
        &self,
        sql: &str,
        chunk: &[UpsertRow],
    ) -> Result<u64, RepositoryError> {
        let mut attempt = 0u32;
        loop {
            match self.write_chunk(sql, chunk).await {
                Ok(written) => return Ok(written),
                Err(error) if error.is_transient() && attempt < self.retry_limit => {
                    attempt += 1;
                    warn!(
                        event_name = "association_store.batch_retry",
                        attempt,
                        error = %error,
                        "transient store error, retrying batch"
                    );
                    tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn write_chunk(&self, sql: &str, chunk: &[UpsertRow]) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for row in chunk {
            sqlx::query(sql)
                .bind(row.product_a_id)
                .bind(row.product_b_id)
                .bind(row.frequency)
                .bind(&row.last_calculated)
                .execute(&mut *tx)
                .await?;
            written += 1;
        }

        tx.commit().await?;
        Ok(written)
    }
}

#[async_trait::async_trait]
impl AssociationStore for SqlAssociationStore {
    async fn clear(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM product_associations").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn upsert_replace(&self, pairs: &[ScoredPair]) -> Result<WriteOutcome, RepositoryError> {
        let rows = pairs
            .iter()
            .map(|scored| UpsertRow {
                product_a_id: scored.pair.product_a().0,
                product_b_id: scored.pair.product_b().0,
                frequency: scored.frequency,
                last_calculated: scored.last_order_at.to_rfc3339(),
            })
            .collect();

        self.write_chunked(UPSERT_REPLACE, rows).await
    }

    async fn upsert_add(
        &self,
        counts: &[RangePairCount],
        calculated_at: DateTime<Utc>,
    ) -> Result<WriteOutcome, RepositoryError> {
        let calculated_at = calculated_at.to_rfc3339();
        let rows = counts
            .iter()
            .map(|range_count| UpsertRow {
                product_a_id: range_count.pair.product_a().0,
                product_b_id: range_count.pair.product_b().0,
                frequency: range_count.count,
                last_calculated: calculated_at.clone(),
            })
            .collect();

        self.write_chunked(UPSERT_ADD, rows).await
    }

    async fn prune(&self, min_support: i64) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM product_associations WHERE frequency_count < ?")
            .bind(min_support)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn cleanup_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM product_associations WHERE last_calculated < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM product_associations")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }

    async fn all(&self) -> Result<Vec<Association>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT product_a_id, product_b_id, frequency_count, last_calculated
             FROM product_associations
             ORDER BY product_a_id ASC, product_b_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(association_from_row).collect()
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn association_from_row(row: SqliteRow) -> Result<Association, RepositoryError> {
    Ok(Association {
        pair: pair_from_columns(row.try_get("product_a_id")?, row.try_get("product_b_id")?)?,
        frequency_count: row.try_get("frequency_count")?,
        last_calculated: parse_timestamp("last_calculated", row.try_get("last_calculated")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use basketry_core::domain::association::{PairKey, ScoredPair};
    use basketry_core::domain::catalog::ProductId;

    use super::SqlAssociationStore;
    use crate::migrations;
    use crate::repositories::{AssociationStore, RangePairCount};
    use crate::{connect_with_settings, DbPool};

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");

        sqlx::query("INSERT INTO categories (id, parent_id, name) VALUES (1, NULL, 'Root')")
            .execute(&pool)
            .await
            .expect("insert category");
        for product in 1..=8_i64 {
            sqlx::query(
                "INSERT INTO products (id, name, brand, category_id, active)
                 VALUES (?, ?, NULL, 1, 1)",
            )
            .bind(product)
            .bind(format!("Product {product}"))
            .execute(&pool)
            .await
            .expect("insert product");
        }

        pool
    }

    fn pair(a: i64, b: i64) -> PairKey {
        PairKey::new(ProductId(a), ProductId(b)).expect("distinct products")
    }

    fn scored(a: i64, b: i64, frequency: i64) -> ScoredPair {
        scored_at(a, b, frequency, parse_ts("2026-05-01T00:00:00Z"))
    }

    fn scored_at(a: i64, b: i64, frequency: i64, last_order_at: DateTime<Utc>) -> ScoredPair {
        ScoredPair { pair: pair(a, b), frequency, last_order_at }
    }

    fn range_count(a: i64, b: i64, count: i64) -> RangePairCount {
        RangePairCount {
            pair: pair(a, b),
            count,
            last_order_at: parse_ts("2026-05-01T00:00:00Z"),
        }
    }

    #[tokio::test]
    async fn replace_upsert_overwrites_frequency() {
        let pool = setup_pool().await;
        let store = SqlAssociationStore::new(pool.clone(), 500, 3);

        store.upsert_replace(&[scored(1, 2, 5)]).await.expect("first replace upsert");
        store.upsert_replace(&[scored(1, 2, 3)]).await.expect("second replace upsert");

        let all = store.all().await.expect("load associations");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].frequency_count, 3);
        assert_eq!(all[0].last_calculated, parse_ts("2026-05-01T00:00:00Z"));

        pool.close().await;
    }

    #[tokio::test]
    async fn additive_upsert_accumulates_frequency() {
        let pool = setup_pool().await;
        let store = SqlAssociationStore::new(pool.clone(), 500, 3);
        let calculated_at = parse_ts("2026-06-01T00:00:00Z");

        store
            .upsert_add(&[range_count(1, 2, 2)], calculated_at)
            .await
            .expect("first additive upsert");
        store
            .upsert_add(&[range_count(1, 2, 3), range_count(2, 3, 1)], calculated_at)
            .await
            .expect("second additive upsert");

        let all = store.all().await.expect("load associations");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].pair, pair(1, 2));
        assert_eq!(all[0].frequency_count, 5);
        assert_eq!(all[1].frequency_count, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn writes_are_chunked_into_independent_batches() {
        let pool = setup_pool().await;
        let store = SqlAssociationStore::new(pool.clone(), 2, 3);

        let pairs =
            vec![scored(1, 2, 2), scored(1, 3, 2), scored(2, 3, 2), scored(3, 4, 2), scored(4, 5, 2)];
        let outcome = store.upsert_replace(&pairs).await.expect("chunked write");

        assert_eq!(outcome.batches_committed, 3);
        assert_eq!(outcome.batches_failed, 0);
        assert_eq!(outcome.rows_written, 5);
        assert_eq!(store.count().await.expect("count"), 5);

        pool.close().await;
    }

    #[tokio::test]
    async fn prune_removes_below_support_rows() {
        let pool = setup_pool().await;
        let store = SqlAssociationStore::new(pool.clone(), 500, 3);
        let calculated_at = parse_ts("2026-06-01T00:00:00Z");

        store
            .upsert_add(
                &[range_count(1, 2, 1), range_count(2, 3, 2), range_count(3, 4, 5)],
                calculated_at,
            )
            .await
            .expect("seed associations");

        let pruned = store.prune(2).await.expect("prune");
        assert_eq!(pruned, 1);

        let all = store.all().await.expect("load associations");
        assert!(all.iter().all(|association| association.frequency_count >= 2));

        pool.close().await;
    }

    #[tokio::test]
    async fn stale_rows_are_cleaned_up_by_cutoff() {
        let pool = setup_pool().await;
        let store = SqlAssociationStore::new(pool.clone(), 500, 3);

        let fresh = parse_ts("2026-06-01T00:00:00Z");
        let stale = fresh - Duration::days(200);

        store.upsert_replace(&[scored_at(1, 2, 3, stale)]).await.expect("stale row");
        store.upsert_replace(&[scored_at(2, 3, 3, fresh)]).await.expect("fresh row");

        let removed =
            store.cleanup_stale(fresh - Duration::days(180)).await.expect("cleanup stale");
        assert_eq!(removed, 1);

        let all = store.all().await.expect("load associations");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].pair, pair(2, 3));

        pool.close().await;
    }

    #[tokio::test]
    async fn clear_empties_the_table() {
        let pool = setup_pool().await;
        let store = SqlAssociationStore::new(pool.clone(), 500, 3);

        store
            .upsert_replace(&[scored(1, 2, 2), scored(2, 3, 4)])
            .await
            .expect("seed associations");

        assert_eq!(store.clear().await.expect("clear"), 2);
        assert_eq!(store.count().await.expect("count"), 0);

        pool.close().await;
    }
}
