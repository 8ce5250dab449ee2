use std::collections::HashMap;

use sqlx::Row;

use basketry_core::domain::catalog::{CategoryId, ProductId, ProductMeta};

use super::{CatalogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CatalogRepository for SqlCatalogRepository {
    async fn product_metadata(
        &self,
    ) -> Result<HashMap<ProductId, ProductMeta>, RepositoryError> {
        // Root category is the one-level parent where present; top-level
        // categories are their own root. Inactive products are omitted on
        // purpose so their pairs get skipped downstream.
        let rows = sqlx::query(
            "SELECT
                p.id AS product_id,
                p.brand AS brand,
                p.category_id AS category_id,
                COALESCE(parent.name, c.name) AS root_category
             FROM products p
             JOIN categories c ON p.category_id = c.id
             LEFT JOIN categories parent ON c.parent_id = parent.id
             WHERE p.active = 1",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut metadata = HashMap::with_capacity(rows.len());
        for row in rows {
            let product_id = ProductId(row.try_get("product_id")?);
            metadata.insert(
                product_id,
                ProductMeta {
                    brand: row.try_get("brand")?,
                    category_id: CategoryId(row.try_get("category_id")?),
                    root_category: row.try_get("root_category")?,
                },
            );
        }

        Ok(metadata)
    }
}
