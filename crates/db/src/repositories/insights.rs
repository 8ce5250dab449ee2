use serde::Serialize;
use sqlx::Row;

use super::RepositoryError;
use crate::DbPool;

/// Read-only aggregate views over the association table. Nothing here
/// writes; a failing insight query never touches store state.
pub struct SqlInsightReporter {
    pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TopPair {
    pub product_a: String,
    pub product_b: String,
    pub frequency: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategoryAffinity {
    pub category_a: String,
    pub category_b: String,
    pub association_count: i64,
    pub avg_frequency: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BrandAffinity {
    pub brand_a: String,
    pub brand_b: String,
    pub association_count: i64,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct InsightReport {
    pub top_pairs: Vec<TopPair>,
    pub category_matrix: Vec<CategoryAffinity>,
    pub brand_matrix: Vec<BrandAffinity>,
}

impl SqlInsightReporter {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn report(&self, limit: i64) -> Result<InsightReport, RepositoryError> {
        Ok(InsightReport {
            top_pairs: self.top_pairs(limit).await?,
            category_matrix: self.category_matrix(limit).await?,
            brand_matrix: self.brand_matrix(limit).await?,
        })
    }

    pub async fn top_pairs(&self, limit: i64) -> Result<Vec<TopPair>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                p1.name AS product_a,
                p2.name AS product_b,
                pa.frequency_count AS frequency
             FROM product_associations pa
             JOIN products p1 ON pa.product_a_id = p1.id
             JOIN products p2 ON pa.product_b_id = p2.id
             ORDER BY pa.frequency_count DESC, p1.name ASC, p2.name ASC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(TopPair {
                    product_a: row.try_get("product_a")?,
                    product_b: row.try_get("product_b")?,
                    frequency: row.try_get("frequency")?,
                })
            })
            .collect()
    }

    /// Cross-category affinity matrix; same-category pairs are excluded
    /// because they carry no cross-sell signal.
    pub async fn category_matrix(
        &self,
        limit: i64,
    ) -> Result<Vec<CategoryAffinity>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                c1.name AS category_a,
                c2.name AS category_b,
                COUNT(*) AS association_count,
                AVG(pa.frequency_count) AS avg_frequency
             FROM product_associations pa
             JOIN products p1 ON pa.product_a_id = p1.id
             JOIN products p2 ON pa.product_b_id = p2.id
             JOIN categories c1 ON p1.category_id = c1.id
             JOIN categories c2 ON p2.category_id = c2.id
             WHERE c1.id != c2.id
             GROUP BY c1.name, c2.name
             ORDER BY association_count DESC, category_a ASC, category_b ASC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(CategoryAffinity {
                    category_a: row.try_get("category_a")?,
                    category_b: row.try_get("category_b")?,
                    association_count: row.try_get("association_count")?,
                    avg_frequency: row.try_get("avg_frequency")?,
                })
            })
            .collect()
    }

    /// Cross-brand affinity matrix; same-brand and unbranded pairs are
    /// excluded.
    pub async fn brand_matrix(&self, limit: i64) -> Result<Vec<BrandAffinity>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                p1.brand AS brand_a,
                p2.brand AS brand_b,
                COUNT(*) AS association_count
             FROM product_associations pa
             JOIN products p1 ON pa.product_a_id = p1.id
             JOIN products p2 ON pa.product_b_id = p2.id
             WHERE p1.brand != p2.brand
               AND p1.brand IS NOT NULL
               AND p2.brand IS NOT NULL
             GROUP BY p1.brand, p2.brand
             ORDER BY association_count DESC, brand_a ASC, brand_b ASC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(BrandAffinity {
                    brand_a: row.try_get("brand_a")?,
                    brand_b: row.try_get("brand_b")?,
                    association_count: row.try_get("association_count")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::SqlInsightReporter;
    use crate::migrations;
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");

        sqlx::query(
            "INSERT INTO categories (id, parent_id, name) VALUES
                (1, NULL, 'Electronics'),
                (2, NULL, 'Kitchen')",
        )
        .execute(&pool)
        .await
        .expect("insert categories");

        sqlx::query(
            "INSERT INTO products (id, name, brand, category_id, active) VALUES
                (1, 'Headphones', 'Acme', 1, 1),
                (2, 'Speaker', 'Volt', 1, 1),
                (3, 'Blender', 'Volt', 2, 1),
                (4, 'Kettle', NULL, 2, 1)",
        )
        .execute(&pool)
        .await
        .expect("insert products");

        sqlx::query(
            "INSERT INTO product_associations
                (product_a_id, product_b_id, frequency_count, last_calculated)
             VALUES
                (1, 2, 9, '2026-06-01T00:00:00+00:00'),
                (1, 3, 5, '2026-06-01T00:00:00+00:00'),
                (2, 3, 3, '2026-06-01T00:00:00+00:00'),
                (3, 4, 2, '2026-06-01T00:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .expect("insert associations");

        pool
    }

    #[tokio::test]
    async fn top_pairs_rank_by_frequency() {
        let pool = setup_pool().await;
        let reporter = SqlInsightReporter::new(pool.clone());

        let top = reporter.top_pairs(2).await.expect("top pairs");

        assert_eq!(top.len(), 2);
        assert_eq!((top[0].product_a.as_str(), top[0].product_b.as_str()), ("Headphones", "Speaker"));
        assert_eq!(top[0].frequency, 9);
        assert_eq!(top[1].frequency, 5);

        pool.close().await;
    }

    #[tokio::test]
    async fn category_matrix_excludes_same_category_pairs() {
        let pool = setup_pool().await;
        let reporter = SqlInsightReporter::new(pool.clone());

        let matrix = reporter.category_matrix(10).await.expect("category matrix");

        // (1,2) is Electronics/Electronics and (3,4) is Kitchen/Kitchen;
        // only the two Electronics-Kitchen edges remain.
        assert_eq!(matrix.len(), 1);
        assert_eq!(
            (matrix[0].category_a.as_str(), matrix[0].category_b.as_str()),
            ("Electronics", "Kitchen")
        );
        assert_eq!(matrix[0].association_count, 2);
        assert!((matrix[0].avg_frequency - 4.0).abs() < 1e-9);

        pool.close().await;
    }

    #[tokio::test]
    async fn brand_matrix_excludes_same_and_missing_brands() {
        let pool = setup_pool().await;
        let reporter = SqlInsightReporter::new(pool.clone());

        let matrix = reporter.brand_matrix(10).await.expect("brand matrix");

        // (2,3) is Volt-Volt and (3,4) has a NULL side; only Acme-Volt edges
        // survive: (1,2) and (1,3).
        assert_eq!(matrix.len(), 1);
        assert_eq!((matrix[0].brand_a.as_str(), matrix[0].brand_b.as_str()), ("Acme", "Volt"));
        assert_eq!(matrix[0].association_count, 2);

        pool.close().await;
    }
}
