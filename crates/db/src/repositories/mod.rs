use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use basketry_core::chrono::{DateTime, Utc};
use basketry_core::domain::association::{Association, PairKey, ScoredPair};
use basketry_core::domain::catalog::{ProductId, ProductMeta};
use basketry_core::domain::order::{AnalysisWindow, LineItemRow};
use basketry_core::AggregatedPair;

pub mod association;
pub mod catalog;
pub mod insights;
pub mod order;

pub use association::SqlAssociationStore;
pub use catalog::SqlCatalogRepository;
pub use insights::{BrandAffinity, CategoryAffinity, InsightReport, SqlInsightReporter, TopPair};
pub use order::SqlOrderHistoryRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RepositoryError {
    /// Whether a batch write hitting this error is worth retrying: lock
    /// contention and connectivity hiccups are, constraint violations and
    /// decode failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::PoolTimedOut) | Self::Database(sqlx::Error::Io(_)) => true,
            Self::Database(sqlx::Error::Database(db_error)) => {
                // SQLITE_BUSY (5) and SQLITE_LOCKED (6), plus their extended
                // codes, all begin with the primary code.
                matches!(
                    db_error.code().as_deref(),
                    Some("5") | Some("6") | Some("261") | Some("262") | Some("517")
                )
            }
            _ => false,
        }
    }
}

/// Bounds of the successful-order id key space inside a window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderIdBounds {
    pub min_order: i64,
    pub max_order: i64,
    pub total_orders: i64,
}

/// Raw pair frequency contributed by one order-id range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangePairCount {
    pub pair: PairKey,
    pub count: i64,
    pub last_order_at: DateTime<Utc>,
}

/// Outcome of a chunked write: how many chunks committed, how many were
/// skipped after retry exhaustion, and how many rows landed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub batches_committed: u32,
    pub batches_failed: u32,
    pub rows_written: u64,
}

#[async_trait]
pub trait OrderHistoryRepository: Send + Sync {
    /// Qualifying line items inside the window (successful orders only).
    async fn count_line_items(&self, window: &AnalysisWindow) -> Result<i64, RepositoryError>;

    /// Deduplicated (order, product) rows ordered by order id, the direct
    /// strategy's input.
    async fn line_items(&self, window: &AnalysisWindow) -> Result<Vec<LineItemRow>, RepositoryError>;

    /// Server-side pair aggregation with the one-directional join predicate,
    /// the single-pass strategy's input. `reference` anchors the recency
    /// weight bands.
    async fn aggregate_pairs(
        &self,
        window: &AnalysisWindow,
        reference: DateTime<Utc>,
    ) -> Result<Vec<AggregatedPair>, RepositoryError>;

    async fn order_id_bounds(
        &self,
        window: &AnalysisWindow,
    ) -> Result<Option<OrderIdBounds>, RepositoryError>;

    /// Raw pair counts for orders with ids in `range` (inclusive), the
    /// incremental strategy's per-batch input.
    async fn pair_counts_in_range(
        &self,
        window: &AnalysisWindow,
        range: (i64, i64),
    ) -> Result<Vec<RangePairCount>, RepositoryError>;
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Brand/category/root-category for every active product.
    async fn product_metadata(&self)
        -> Result<HashMap<ProductId, ProductMeta>, RepositoryError>;
}

#[async_trait]
pub trait AssociationStore: Send + Sync {
    async fn clear(&self) -> Result<u64, RepositoryError>;

    /// Insert-or-replace: the stored frequency becomes the given one and
    /// `last_calculated` tracks the pair's most recent supporting order.
    async fn upsert_replace(&self, pairs: &[ScoredPair]) -> Result<WriteOutcome, RepositoryError>;

    /// Insert-or-accumulate: the given count is added to any stored one.
    async fn upsert_add(
        &self,
        counts: &[RangePairCount],
        calculated_at: DateTime<Utc>,
    ) -> Result<WriteOutcome, RepositoryError>;

    /// Deletes rows below the support threshold; returns how many went.
    async fn prune(&self, min_support: i64) -> Result<u64, RepositoryError>;

    /// Deletes rows last calculated before `cutoff`.
    async fn cleanup_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;

    async fn count(&self) -> Result<i64, RepositoryError>;

    async fn all(&self) -> Result<Vec<Association>, RepositoryError>;

    /// Cheap connectivity probe, used to tell a failed batch from a lost
    /// database.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn pair_from_columns(product_a: i64, product_b: i64) -> Result<PairKey, RepositoryError> {
    PairKey::new(ProductId(product_a), ProductId(product_b)).ok_or_else(|| {
        RepositoryError::Decode(format!(
            "degenerate pair ({product_a}, {product_b}): endpoints must differ"
        ))
    })
}
