use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

use basketry_core::chrono::{DateTime, Duration, Utc};
use basketry_core::config::{ConfigError, EngineConfig};
use basketry_core::domain::association::ScoredPair;
use basketry_core::domain::order::AnalysisWindow;
use basketry_core::rules::{BusinessRuleAdjuster, RuleSet};
use basketry_core::strategy::{batch_width, BatchPlan, ExecutionStrategy};
use basketry_core::{Aggregation, FrequencyAggregator, PairExtractor, RunReport};

use crate::repositories::{
    AssociationStore, CatalogRepository, OrderHistoryRepository, RepositoryError,
    SqlAssociationStore, SqlCatalogRepository, SqlOrderHistoryRepository,
};
use crate::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid configuration; raised before anything is written.
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    /// The store (or order history) went away and stayed away. Carries the
    /// partial-progress report so callers can see which batches committed.
    #[error("store unavailable: {source}")]
    Store {
        source: RepositoryError,
        report: Box<RunReport>,
    },
}

/// Drives one association run: selects an execution strategy from input
/// volume, computes pair frequencies, and maintains the association table.
pub struct AssociationEngine<O, C, S> {
    orders: O,
    catalog: C,
    store: S,
    config: EngineConfig,
}

pub type SqlAssociationEngine =
    AssociationEngine<SqlOrderHistoryRepository, SqlCatalogRepository, SqlAssociationStore>;

impl SqlAssociationEngine {
    pub fn with_pool(pool: DbPool, config: EngineConfig) -> Self {
        let store = SqlAssociationStore::new(
            pool.clone(),
            config.write_batch_size as usize,
            config.batch_retry_limit,
        );
        Self {
            orders: SqlOrderHistoryRepository::new(pool.clone()),
            catalog: SqlCatalogRepository::new(pool),
            store,
            config,
        }
    }
}

impl<O, C, S> AssociationEngine<O, C, S>
where
    O: OrderHistoryRepository,
    C: CatalogRepository,
    S: AssociationStore,
{
    pub fn new(orders: O, catalog: C, store: S, config: EngineConfig) -> Self {
        Self { orders, catalog, store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// One full engine invocation anchored at `reference` ("now").
    pub async fn run(&self, reference: DateTime<Utc>) -> Result<RunReport, EngineError> {
        self.config.validate()?;

        let window = AnalysisWindow::trailing_days(reference, self.config.window_days)
            .ok_or_else(|| {
                ConfigError::Validation("analysis window must span at least one day".to_string())
            })?;

        let started = Instant::now();
        let mut report = RunReport::new(Uuid::new_v4().to_string());

        let line_items = self
            .orders
            .count_line_items(&window)
            .await
            .map_err(|source| store_failure(source, &report))?;

        let strategy = self
            .config
            .force_strategy
            .unwrap_or_else(|| ExecutionStrategy::select(line_items, self.config.thresholds()));
        report.strategy = Some(strategy);
        report.line_items_considered = line_items;

        info!(
            event_name = "engine.run_started",
            run_id = %report.run_id,
            strategy = %strategy,
            line_items,
            window_days = self.config.window_days,
            "starting association run"
        );

        match strategy {
            ExecutionStrategy::Direct => {
                self.run_direct(&window, reference, &mut report).await?;
            }
            ExecutionStrategy::SinglePass => {
                self.run_single_pass(&window, reference, &mut report).await?;
            }
            ExecutionStrategy::IncrementalBatched => {
                self.run_incremental(&window, reference, &mut report).await?;
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            event_name = "engine.run_completed",
            run_id = %report.run_id,
            strategy = %strategy,
            pairs_considered = report.pairs_considered,
            pairs_accepted = report.pairs_accepted,
            pairs_dropped_by_cap = report.pairs_dropped_by_cap,
            pairs_dropped_missing_metadata = report.pairs_dropped_missing_metadata,
            batches_committed = report.batches_committed,
            batches_failed = report.batches_failed,
            duration_ms = report.duration_ms,
            "association run completed"
        );

        Ok(report)
    }

    /// Maintenance: drop associations below the configured support.
    pub async fn prune(&self) -> Result<u64, EngineError> {
        self.config.validate()?;
        self.store
            .prune(self.config.min_support)
            .await
            .map_err(|source| store_failure(source, &RunReport::default()))
    }

    /// Maintenance: drop associations not recalculated within the retention
    /// window ending at `reference`.
    pub async fn cleanup_stale(&self, reference: DateTime<Utc>) -> Result<u64, EngineError> {
        self.config.validate()?;
        let cutoff = reference - Duration::days(i64::from(self.config.stale_max_age_days));
        self.store
            .cleanup_stale(cutoff)
            .await
            .map_err(|source| store_failure(source, &RunReport::default()))
    }

    async fn run_direct(
        &self,
        window: &AnalysisWindow,
        reference: DateTime<Utc>,
        report: &mut RunReport,
    ) -> Result<(), EngineError> {
        let rows = self
            .orders
            .line_items(window)
            .await
            .map_err(|source| store_failure(source, report))?;

        let aggregation = self.aggregator(reference).aggregate(PairExtractor::new(rows.into_iter()));
        self.adjust_and_replace(aggregation, report).await
    }

    async fn run_single_pass(
        &self,
        window: &AnalysisWindow,
        reference: DateTime<Utc>,
        report: &mut RunReport,
    ) -> Result<(), EngineError> {
        let rows = self
            .orders
            .aggregate_pairs(window, reference)
            .await
            .map_err(|source| store_failure(source, report))?;

        let aggregation = self.aggregator(reference).finalize(rows);
        self.adjust_and_replace(aggregation, report).await
    }

    async fn run_incremental(
        &self,
        window: &AnalysisWindow,
        reference: DateTime<Utc>,
        report: &mut RunReport,
    ) -> Result<(), EngineError> {
        let bounds = self
            .orders
            .order_id_bounds(window)
            .await
            .map_err(|source| store_failure(source, report))?;

        // Each run accumulates from scratch over its own window.
        self.store.clear().await.map_err(|source| store_failure(source, report))?;

        let Some(bounds) = bounds else {
            return Ok(());
        };

        let width = batch_width(bounds.total_orders);
        let plan = BatchPlan::new(bounds.min_order, bounds.max_order, width);

        info!(
            event_name = "engine.incremental_plan",
            run_id = %report.run_id,
            total_orders = bounds.total_orders,
            batch_width = width,
            batches = plan.len(),
            "partitioned order id key space"
        );

        for &range in plan.ranges() {
            let counts = match self.orders.pair_counts_in_range(window, range).await {
                Ok(counts) => counts,
                Err(error) if error.is_transient() => {
                    warn!(
                        event_name = "engine.batch_read_failed",
                        run_id = %report.run_id,
                        range_start = range.0,
                        range_end = range.1,
                        error = %error,
                        "skipping order range after read failure"
                    );
                    report.batches_failed += 1;
                    self.ensure_connected(report).await?;
                    continue;
                }
                Err(source) => return Err(store_failure(source, report)),
            };

            report.pairs_considered += counts.len() as u64;

            let outcome = self
                .store
                .upsert_add(&counts, reference)
                .await
                .map_err(|source| store_failure(source, report))?;

            report.batches_committed += outcome.batches_committed;
            report.batches_failed += outcome.batches_failed;
            report.associations_written += outcome.rows_written;

            if outcome.batches_failed > 0 {
                // A skipped batch is survivable; a dead database is not.
                self.ensure_connected(report).await?;
            }
        }

        // Partial sums can sit below threshold until every range has
        // contributed, so the support filter runs once at the end.
        let pruned = self
            .store
            .prune(self.config.min_support)
            .await
            .map_err(|source| store_failure(source, report))?;
        report.associations_pruned = pruned;

        if self.config.reapply_rules_after_batches {
            self.reapply_rules(report).await?;
        }

        let remaining =
            self.store.count().await.map_err(|source| store_failure(source, report))?;
        report.pairs_accepted = remaining as u64;

        Ok(())
    }

    /// Shared tail of the two full-recompute strategies: business rules,
    /// per-product cap, then a wholesale replace of the stored set.
    async fn adjust_and_replace(
        &self,
        aggregation: Aggregation,
        report: &mut RunReport,
    ) -> Result<(), EngineError> {
        report.pairs_considered += aggregation.considered as u64;
        if aggregation.truncated > 0 {
            report.pairs_truncated += aggregation.truncated as u64;
            warn!(
                event_name = "engine.pair_ceiling_exceeded",
                run_id = %report.run_id,
                truncated = aggregation.truncated,
                ceiling = self.config.max_pairs,
                "aggregation exceeded the pair ceiling; keeping highest-frequency pairs"
            );
        }

        let metadata = self
            .catalog
            .product_metadata()
            .await
            .map_err(|source| store_failure(source, report))?;

        let adjusted = self.adjuster().adjust(aggregation.pairs, &metadata);
        report.pairs_dropped_by_cap += adjusted.dropped_by_cap as u64;
        report.pairs_dropped_missing_metadata += adjusted.dropped_missing_metadata as u64;
        report.pairs_accepted = adjusted.pairs.len() as u64;

        self.store.clear().await.map_err(|source| store_failure(source, report))?;

        let outcome = self
            .store
            .upsert_replace(&adjusted.pairs)
            .await
            .map_err(|source| store_failure(source, report))?;

        report.batches_committed += outcome.batches_committed;
        report.batches_failed += outcome.batches_failed;
        report.associations_written += outcome.rows_written;

        if outcome.batches_failed > 0 {
            self.ensure_connected(report).await?;
        }

        Ok(())
    }

    /// Optional post-hoc pass over an incrementally accumulated table: the
    /// stored raw sums get the same rules and cap the one-shot tiers apply.
    async fn reapply_rules(&self, report: &mut RunReport) -> Result<(), EngineError> {
        let stored = self.store.all().await.map_err(|source| store_failure(source, report))?;

        let pairs: Vec<ScoredPair> = stored
            .into_iter()
            .map(|association| ScoredPair {
                pair: association.pair,
                frequency: association.frequency_count,
                last_order_at: association.last_calculated,
            })
            .collect();

        let metadata = self
            .catalog
            .product_metadata()
            .await
            .map_err(|source| store_failure(source, report))?;

        let adjusted = self.adjuster().adjust(pairs, &metadata);
        report.pairs_dropped_by_cap += adjusted.dropped_by_cap as u64;
        report.pairs_dropped_missing_metadata += adjusted.dropped_missing_metadata as u64;

        self.store.clear().await.map_err(|source| store_failure(source, report))?;

        let outcome = self
            .store
            .upsert_replace(&adjusted.pairs)
            .await
            .map_err(|source| store_failure(source, report))?;

        report.batches_committed += outcome.batches_committed;
        report.batches_failed += outcome.batches_failed;
        report.associations_written += outcome.rows_written;

        Ok(())
    }

    async fn ensure_connected(&self, report: &RunReport) -> Result<(), EngineError> {
        self.store.ping().await.map_err(|source| store_failure(source, report))
    }

    fn aggregator(&self, reference: DateTime<Utc>) -> FrequencyAggregator {
        FrequencyAggregator {
            min_support: self.config.min_support,
            recency_weighting: self.config.recency_weighting,
            max_pairs: self.config.max_pairs as usize,
            reference,
        }
    }

    fn adjuster(&self) -> BusinessRuleAdjuster {
        BusinessRuleAdjuster::new(
            RuleSet::standard(self.config.cross_category_boost, self.config.same_brand_penalty),
            self.config.per_product_cap as usize,
        )
    }
}

fn store_failure(source: RepositoryError, report: &RunReport) -> EngineError {
    EngineError::Store { source, report: Box::new(report.clone()) }
}
