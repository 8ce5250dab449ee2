use chrono::Duration;
use sqlx::{sqlite::SqliteRow, Row};

use basketry_core::chrono::{DateTime, Utc};
use basketry_core::domain::catalog::ProductId;
use basketry_core::domain::order::{AnalysisWindow, LineItemRow, OrderId, OrderStatus};
use basketry_core::AggregatedPair;

use super::{
    pair_from_columns, parse_timestamp, OrderHistoryRepository, OrderIdBounds, RangePairCount,
    RepositoryError,
};
use crate::DbPool;

/// Window and status filter shared by every query below: successful orders
/// placed inside the closed analysis window. Binds (start, end).
fn qualifying_order_clause() -> String {
    let statuses = OrderStatus::successful()
        .map(|status| format!("'{}'", status.as_str()))
        .join(", ");
    format!("o.placed_at >= ? AND o.placed_at <= ? AND o.status IN ({statuses})")
}

pub struct SqlOrderHistoryRepository {
    pool: DbPool,
}

impl SqlOrderHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OrderHistoryRepository for SqlOrderHistoryRepository {
    async fn count_line_items(&self, window: &AnalysisWindow) -> Result<i64, RepositoryError> {
        let qualifying = qualifying_order_clause();
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS line_items
             FROM order_items oi
             JOIN orders o ON o.id = oi.order_id
             WHERE {qualifying}",
        ))
        .bind(window.start.to_rfc3339())
        .bind(window.end.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("line_items")?)
    }

    async fn line_items(
        &self,
        window: &AnalysisWindow,
    ) -> Result<Vec<LineItemRow>, RepositoryError> {
        let qualifying = qualifying_order_clause();
        let rows = sqlx::query(&format!(
            "SELECT DISTINCT oi.order_id, oi.product_id, o.placed_at
             FROM order_items oi
             JOIN orders o ON o.id = oi.order_id
             WHERE {qualifying}
             ORDER BY oi.order_id ASC, oi.product_id ASC",
        ))
        .bind(window.start.to_rfc3339())
        .bind(window.end.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(line_item_from_row).collect()
    }

    async fn aggregate_pairs(
        &self,
        window: &AnalysisWindow,
        reference: DateTime<Utc>,
    ) -> Result<Vec<AggregatedPair>, RepositoryError> {
        // One-directional join predicate keeps each unordered pair from
        // being generated twice; the DISTINCT guards against duplicate line
        // items within an order.
        let qualifying = qualifying_order_clause();
        let rows = sqlx::query(&format!(
            "WITH order_pairs AS (
                SELECT DISTINCT
                    oi1.order_id AS order_id,
                    oi1.product_id AS product_a_id,
                    oi2.product_id AS product_b_id,
                    o.placed_at AS placed_at
                FROM order_items oi1
                JOIN order_items oi2
                    ON oi1.order_id = oi2.order_id
                    AND oi1.product_id < oi2.product_id
                JOIN orders o ON o.id = oi1.order_id
                WHERE {qualifying}
            )
            SELECT
                product_a_id,
                product_b_id,
                COUNT(*) AS raw_count,
                COUNT(DISTINCT order_id) AS distinct_orders,
                SUM(CASE
                    WHEN placed_at >= ? THEN 2.0
                    WHEN placed_at >= ? THEN 1.5
                    WHEN placed_at >= ? THEN 1.2
                    ELSE 1.0
                END) AS weighted_sum,
                MAX(placed_at) AS last_order_at
            FROM order_pairs
            GROUP BY product_a_id, product_b_id",
        ))
        .bind(window.start.to_rfc3339())
        .bind(window.end.to_rfc3339())
        .bind((reference - Duration::days(30)).to_rfc3339())
        .bind((reference - Duration::days(90)).to_rfc3339())
        .bind((reference - Duration::days(180)).to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(aggregated_pair_from_row).collect()
    }

    async fn order_id_bounds(
        &self,
        window: &AnalysisWindow,
    ) -> Result<Option<OrderIdBounds>, RepositoryError> {
        let qualifying = qualifying_order_clause();
        let row = sqlx::query(&format!(
            "SELECT MIN(o.id) AS min_order, MAX(o.id) AS max_order, COUNT(*) AS total_orders
             FROM orders o
             WHERE {qualifying}",
        ))
        .bind(window.start.to_rfc3339())
        .bind(window.end.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        let min_order: Option<i64> = row.try_get("min_order")?;
        let max_order: Option<i64> = row.try_get("max_order")?;
        let total_orders: i64 = row.try_get("total_orders")?;

        Ok(match (min_order, max_order) {
            (Some(min_order), Some(max_order)) => {
                Some(OrderIdBounds { min_order, max_order, total_orders })
            }
            _ => None,
        })
    }

    async fn pair_counts_in_range(
        &self,
        window: &AnalysisWindow,
        range: (i64, i64),
    ) -> Result<Vec<RangePairCount>, RepositoryError> {
        let qualifying = qualifying_order_clause();
        let rows = sqlx::query(&format!(
            "WITH order_pairs AS (
                SELECT DISTINCT
                    oi1.order_id AS order_id,
                    oi1.product_id AS product_a_id,
                    oi2.product_id AS product_b_id,
                    o.placed_at AS placed_at
                FROM order_items oi1
                JOIN order_items oi2
                    ON oi1.order_id = oi2.order_id
                    AND oi1.product_id < oi2.product_id
                JOIN orders o ON o.id = oi1.order_id
                WHERE oi1.order_id BETWEEN ? AND ?
                  AND {qualifying}
            )
            SELECT
                product_a_id,
                product_b_id,
                COUNT(*) AS pair_count,
                MAX(placed_at) AS last_order_at
            FROM order_pairs
            GROUP BY product_a_id, product_b_id",
        ))
        .bind(range.0)
        .bind(range.1)
        .bind(window.start.to_rfc3339())
        .bind(window.end.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(range_pair_from_row).collect()
    }
}

fn line_item_from_row(row: SqliteRow) -> Result<LineItemRow, RepositoryError> {
    Ok(LineItemRow {
        order_id: OrderId(row.try_get("order_id")?),
        product_id: ProductId(row.try_get("product_id")?),
        placed_at: parse_timestamp("placed_at", row.try_get("placed_at")?)?,
    })
}

fn aggregated_pair_from_row(row: SqliteRow) -> Result<AggregatedPair, RepositoryError> {
    Ok(AggregatedPair {
        pair: pair_from_columns(row.try_get("product_a_id")?, row.try_get("product_b_id")?)?,
        raw_count: row.try_get("raw_count")?,
        distinct_orders: row.try_get("distinct_orders")?,
        weighted_sum: row.try_get("weighted_sum")?,
        last_order_at: parse_timestamp("last_order_at", row.try_get("last_order_at")?)?,
    })
}

fn range_pair_from_row(row: SqliteRow) -> Result<RangePairCount, RepositoryError> {
    Ok(RangePairCount {
        pair: pair_from_columns(row.try_get("product_a_id")?, row.try_get("product_b_id")?)?,
        count: row.try_get("pair_count")?,
        last_order_at: parse_timestamp("last_order_at", row.try_get("last_order_at")?)?,
    })
}
