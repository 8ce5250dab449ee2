pub mod aggregate;
pub mod config;
pub mod domain;
pub mod pairs;
pub mod report;
pub mod rules;
pub mod strategy;

pub use aggregate::{AggregatedPair, Aggregation, FrequencyAggregator};
pub use config::{AppConfig, ConfigError, DatabaseConfig, EngineConfig, LoggingConfig};
pub use domain::association::{Association, PairKey, ScoredPair};
pub use domain::catalog::{CategoryId, ProductId, ProductMeta};
pub use domain::order::{AnalysisWindow, LineItemRow, OrderId, OrderStatus};
pub use pairs::{CoOccurrence, PairExtractor};
pub use report::RunReport;
pub use rules::{AdjustedPairs, BusinessRuleAdjuster, PairMeta, RuleSet};
pub use strategy::{BatchPlan, ExecutionStrategy, StrategyThresholds};

pub use chrono;
