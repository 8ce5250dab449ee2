use serde::Serialize;
use sqlx::{Executor, Row};

use crate::repositories::RepositoryError;
use crate::DbPool;

/// Deterministic demo catalog and order history for local runs and smoke
/// tests. Loading resets the catalog/order tables, so it is strictly a
/// development fixture.
pub struct DemoDataset;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub categories: i64,
    pub products: i64,
    pub orders: i64,
    pub order_items: i64,
}

impl DemoDataset {
    /// SQL fixture content for the demo dataset.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_dataset.sql");

    /// Load the demo dataset into the database, replacing existing rows.
    pub async fn load(pool: &DbPool) -> Result<SeedSummary, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Self::summary(pool).await
    }

    pub async fn summary(pool: &DbPool) -> Result<SeedSummary, RepositoryError> {
        Ok(SeedSummary {
            categories: count_rows(pool, "categories").await?,
            products: count_rows(pool, "products").await?,
            orders: count_rows(pool, "orders").await?,
            order_items: count_rows(pool, "order_items").await?,
        })
    }
}

async fn count_rows(pool: &DbPool, table: &str) -> Result<i64, RepositoryError> {
    // Table names come from the fixed list above, never from input.
    let row =
        sqlx::query(&format!("SELECT COUNT(*) AS count FROM {table}")).fetch_one(pool).await?;
    Ok(row.try_get("count")?)
}
