use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::domain::association::{PairKey, ScoredPair};
use crate::domain::order::OrderId;
use crate::pairs::CoOccurrence;

/// Step weight for an order placed `age` before the run reference time.
/// Recent orders count more; anything older than 180 days counts once.
pub fn recency_weight(age: Duration) -> f64 {
    if age <= Duration::days(30) {
        2.0
    } else if age <= Duration::days(90) {
        1.5
    } else if age <= Duration::days(180) {
        1.2
    } else {
        1.0
    }
}

/// Per-pair totals before support filtering. The single-pass SQL strategy
/// produces these rows directly; the direct strategy builds them from
/// extracted co-occurrences.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregatedPair {
    pub pair: PairKey,
    pub raw_count: i64,
    pub distinct_orders: i64,
    pub weighted_sum: f64,
    pub last_order_at: DateTime<Utc>,
}

/// Aggregation outcome: retained pairs in descending frequency order, plus
/// how many pairs fell off the hard ceiling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Aggregation {
    pub pairs: Vec<ScoredPair>,
    pub considered: usize,
    pub truncated: usize,
}

/// Counts canonical pair occurrences across orders and applies the support
/// filter: a pair survives only when its (possibly recency-weighted,
/// rounded) frequency reaches `min_support` and it was seen in at least two
/// distinct orders.
#[derive(Clone, Copy, Debug)]
pub struct FrequencyAggregator {
    pub min_support: i64,
    pub recency_weighting: bool,
    pub max_pairs: usize,
    pub reference: DateTime<Utc>,
}

struct PairAccumulator {
    raw_count: i64,
    distinct_orders: i64,
    weighted_sum: f64,
    last_order_at: DateTime<Utc>,
    last_order_id: OrderId,
}

impl FrequencyAggregator {
    pub fn aggregate(&self, occurrences: impl Iterator<Item = CoOccurrence>) -> Aggregation {
        let mut accumulators: HashMap<PairKey, PairAccumulator> = HashMap::new();

        for occurrence in occurrences {
            let age = self.reference - occurrence.placed_at;
            let weight = recency_weight(age);

            match accumulators.get_mut(&occurrence.pair) {
                Some(entry) => {
                    // Rows arrive grouped by order, so a repeat of the same
                    // order id for a pair is a duplicate, not a new order.
                    if entry.last_order_id == occurrence.order_id {
                        continue;
                    }
                    entry.raw_count += 1;
                    entry.distinct_orders += 1;
                    entry.weighted_sum += weight;
                    entry.last_order_at = entry.last_order_at.max(occurrence.placed_at);
                    entry.last_order_id = occurrence.order_id;
                }
                None => {
                    accumulators.insert(
                        occurrence.pair,
                        PairAccumulator {
                            raw_count: 1,
                            distinct_orders: 1,
                            weighted_sum: weight,
                            last_order_at: occurrence.placed_at,
                            last_order_id: occurrence.order_id,
                        },
                    );
                }
            }
        }

        let rows = accumulators
            .into_iter()
            .map(|(pair, entry)| AggregatedPair {
                pair,
                raw_count: entry.raw_count,
                distinct_orders: entry.distinct_orders,
                weighted_sum: entry.weighted_sum,
                last_order_at: entry.last_order_at,
            })
            .collect();

        self.finalize(rows)
    }

    /// Applies frequency selection, ordering and the hard ceiling to
    /// pre-aggregated rows.
    pub fn finalize(&self, rows: Vec<AggregatedPair>) -> Aggregation {
        let considered = rows.len();

        let mut pairs: Vec<ScoredPair> = rows
            .into_iter()
            .filter_map(|row| {
                let frequency = if self.recency_weighting {
                    row.weighted_sum.round() as i64
                } else {
                    row.raw_count
                };

                (frequency >= self.min_support && row.distinct_orders >= 2).then_some(ScoredPair {
                    pair: row.pair,
                    frequency,
                    last_order_at: row.last_order_at,
                })
            })
            .collect();

        // Highest-value pairs are kept first when the ceiling truncates.
        pairs.sort_by(|left, right| {
            right.frequency.cmp(&left.frequency).then_with(|| left.pair.cmp(&right.pair))
        });

        let truncated = pairs.len().saturating_sub(self.max_pairs);
        pairs.truncate(self.max_pairs);

        Aggregation { pairs, considered, truncated }
    }
}
