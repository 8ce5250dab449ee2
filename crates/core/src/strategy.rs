use serde::{Deserialize, Serialize};

/// How a run computes and writes associations, chosen by input volume.
///
/// `Direct` and `SinglePass` recompute from a clean slate and replace the
/// stored set wholesale; `IncrementalBatched` accumulates raw counts
/// additively per order-id range and prunes once at the end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStrategy {
    Direct,
    SinglePass,
    #[serde(rename = "incremental")]
    IncrementalBatched,
}

impl ExecutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::SinglePass => "single-pass",
            Self::IncrementalBatched => "incremental",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "direct" => Some(Self::Direct),
            "single-pass" => Some(Self::SinglePass),
            "incremental" => Some(Self::IncrementalBatched),
            _ => None,
        }
    }

    /// Pure volume-based selection over the qualifying line-item count.
    pub fn select(line_items: i64, thresholds: StrategyThresholds) -> Self {
        if line_items < thresholds.direct_max {
            Self::Direct
        } else if line_items < thresholds.single_pass_max {
            Self::SinglePass
        } else {
            Self::IncrementalBatched
        }
    }
}

impl std::fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| {
            format!("unknown strategy `{value}` (expected direct|single-pass|incremental)")
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StrategyThresholds {
    pub direct_max: i64,
    pub single_pass_max: i64,
}

impl Default for StrategyThresholds {
    fn default() -> Self {
        Self { direct_max: 50_000, single_pass_max: 200_000 }
    }
}

/// Range width for incremental batching: at most 20 batches, each between
/// 1_000 and 10_000 order ids wide.
pub fn batch_width(total_orders: i64) -> i64 {
    (total_orders / 20).clamp(1_000, 10_000)
}

/// Contiguous, inclusive order-id ranges covering `[min_order, max_order]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchPlan {
    ranges: Vec<(i64, i64)>,
}

impl BatchPlan {
    pub fn new(min_order: i64, max_order: i64, width: i64) -> Self {
        let mut ranges = Vec::new();
        if min_order > max_order || width <= 0 {
            return Self { ranges };
        }

        let mut start = min_order;
        while start <= max_order {
            let end = (start + width - 1).min(max_order);
            ranges.push((start, end));
            start = end + 1;
        }

        Self { ranges }
    }

    pub fn ranges(&self) -> &[(i64, i64)] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{batch_width, BatchPlan, ExecutionStrategy, StrategyThresholds};

    #[test]
    fn selection_respects_tier_boundaries() {
        let thresholds = StrategyThresholds::default();

        assert_eq!(ExecutionStrategy::select(0, thresholds), ExecutionStrategy::Direct);
        assert_eq!(ExecutionStrategy::select(49_999, thresholds), ExecutionStrategy::Direct);
        assert_eq!(ExecutionStrategy::select(50_000, thresholds), ExecutionStrategy::SinglePass);
        assert_eq!(ExecutionStrategy::select(199_999, thresholds), ExecutionStrategy::SinglePass);
        assert_eq!(
            ExecutionStrategy::select(200_000, thresholds),
            ExecutionStrategy::IncrementalBatched
        );
        assert_eq!(
            ExecutionStrategy::select(600_000, thresholds),
            ExecutionStrategy::IncrementalBatched
        );
    }

    #[test]
    fn strategy_round_trips_through_str() {
        for strategy in [
            ExecutionStrategy::Direct,
            ExecutionStrategy::SinglePass,
            ExecutionStrategy::IncrementalBatched,
        ] {
            assert_eq!(ExecutionStrategy::parse(strategy.as_str()), Some(strategy));
        }
        assert_eq!(ExecutionStrategy::parse("quadratic"), None);
    }

    #[test]
    fn batch_width_is_clamped() {
        assert_eq!(batch_width(100), 1_000);
        assert_eq!(batch_width(20_000), 1_000);
        assert_eq!(batch_width(100_000), 5_000);
        assert_eq!(batch_width(200_000), 10_000);
        assert_eq!(batch_width(5_000_000), 10_000);
    }

    #[test]
    fn plan_covers_the_key_space_contiguously() {
        let plan = BatchPlan::new(1, 25_000, 10_000);

        assert_eq!(plan.ranges(), &[(1, 10_000), (10_001, 20_000), (20_001, 25_000)]);
    }

    #[test]
    fn order_id_range_with_width_10_000_yields_ceil_ranges() {
        // 60_000 order ids at width 10_000 is exactly six batches.
        let plan = BatchPlan::new(1, 60_000, 10_000);
        assert_eq!(plan.len(), 6);

        // A partial tail adds one more.
        let plan = BatchPlan::new(1, 60_001, 10_000);
        assert_eq!(plan.len(), 7);
    }

    #[test]
    fn degenerate_plans_are_empty() {
        assert!(BatchPlan::new(10, 5, 1_000).is_empty());
        assert!(BatchPlan::new(1, 10, 0).is_empty());
    }

    #[test]
    fn single_order_key_space_is_one_range() {
        let plan = BatchPlan::new(42, 42, 1_000);
        assert_eq!(plan.ranges(), &[(42, 42)]);
    }
}
