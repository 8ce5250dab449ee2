use std::collections::HashMap;

use crate::domain::association::ScoredPair;
use crate::domain::catalog::{ProductId, ProductMeta};

/// Metadata view of one pair, handed to each rule.
#[derive(Clone, Copy, Debug)]
pub struct PairMeta<'a> {
    pub a: &'a ProductMeta,
    pub b: &'a ProductMeta,
}

type FrequencyRule = Box<dyn Fn(&PairMeta<'_>) -> f64 + Send + Sync>;

/// Ordered list of pure multiplier rules. Rules are applied in insertion
/// order and multiply into a single factor per pair.
pub struct RuleSet {
    rules: Vec<FrequencyRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<FrequencyRule>) -> Self {
        Self { rules }
    }

    /// The stock rule order: cross-category boost, then same-brand penalty.
    pub fn standard(cross_category_boost: f64, same_brand_penalty: f64) -> Self {
        Self::new(vec![
            Box::new(move |meta: &PairMeta<'_>| {
                if meta.a.root_category != meta.b.root_category {
                    cross_category_boost
                } else {
                    1.0
                }
            }),
            Box::new(move |meta: &PairMeta<'_>| {
                match (meta.a.distinct_brand(), meta.b.distinct_brand()) {
                    (Some(brand_a), Some(brand_b)) if brand_a == brand_b => same_brand_penalty,
                    _ => 1.0,
                }
            }),
        ])
    }

    pub fn multiplier(&self, meta: &PairMeta<'_>) -> f64 {
        self.rules.iter().fold(1.0, |factor, rule| factor * rule(meta))
    }
}

/// Outcome of the adjustment pass, with the counts the run report needs.
#[derive(Debug, Default)]
pub struct AdjustedPairs {
    pub pairs: Vec<ScoredPair>,
    pub dropped_by_cap: usize,
    pub dropped_missing_metadata: usize,
}

/// Rescales pair frequencies by business rules and enforces the per-product
/// association cap.
pub struct BusinessRuleAdjuster {
    rules: RuleSet,
    per_product_cap: usize,
}

impl BusinessRuleAdjuster {
    pub fn new(rules: RuleSet, per_product_cap: usize) -> Self {
        Self { rules, per_product_cap }
    }

    /// Adjusts each pair's frequency (floored at 1, rounded to integer),
    /// then accepts pairs in descending adjusted order while both endpoints
    /// remain under the cap. Pairs whose metadata is missing for either
    /// product are skipped, not errors.
    pub fn adjust(
        &self,
        pairs: Vec<ScoredPair>,
        metadata: &HashMap<ProductId, ProductMeta>,
    ) -> AdjustedPairs {
        let mut dropped_missing_metadata = 0usize;
        let mut adjusted: Vec<ScoredPair> = Vec::with_capacity(pairs.len());

        for scored in pairs {
            let (meta_a, meta_b) = match (
                metadata.get(&scored.pair.product_a()),
                metadata.get(&scored.pair.product_b()),
            ) {
                (Some(meta_a), Some(meta_b)) => (meta_a, meta_b),
                _ => {
                    dropped_missing_metadata += 1;
                    continue;
                }
            };

            let factor = self.rules.multiplier(&PairMeta { a: meta_a, b: meta_b });
            let frequency = ((scored.frequency as f64) * factor).round().max(1.0) as i64;

            adjusted.push(ScoredPair { frequency, ..scored });
        }

        // The cap intentionally keeps the highest-value edges of popular
        // products, so ranking happens on adjusted frequencies.
        adjusted.sort_by(|left, right| {
            right.frequency.cmp(&left.frequency).then_with(|| left.pair.cmp(&right.pair))
        });

        let mut endpoint_counts: HashMap<ProductId, usize> = HashMap::new();
        let mut dropped_by_cap = 0usize;
        let mut accepted: Vec<ScoredPair> = Vec::with_capacity(adjusted.len());

        for scored in adjusted {
            let count_a = endpoint_counts.get(&scored.pair.product_a()).copied().unwrap_or(0);
            let count_b = endpoint_counts.get(&scored.pair.product_b()).copied().unwrap_or(0);

            if count_a < self.per_product_cap && count_b < self.per_product_cap {
                *endpoint_counts.entry(scored.pair.product_a()).or_insert(0) += 1;
                *endpoint_counts.entry(scored.pair.product_b()).or_insert(0) += 1;
                accepted.push(scored);
            } else {
                dropped_by_cap += 1;
            }
        }

        AdjustedPairs { pairs: accepted, dropped_by_cap, dropped_missing_metadata }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{DateTime, Utc};

    use crate::domain::association::{PairKey, ScoredPair};
    use crate::domain::catalog::{CategoryId, ProductId, ProductMeta};

    use super::{BusinessRuleAdjuster, PairMeta, RuleSet};

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn meta(brand: Option<&str>, category: i64, root: &str) -> ProductMeta {
        ProductMeta {
            brand: brand.map(str::to_string),
            category_id: CategoryId(category),
            root_category: root.to_string(),
        }
    }

    fn scored(a: i64, b: i64, frequency: i64) -> ScoredPair {
        ScoredPair {
            pair: PairKey::new(ProductId(a), ProductId(b)).expect("distinct products"),
            frequency,
            last_order_at: parse_ts("2026-04-01T00:00:00Z"),
        }
    }

    fn adjuster(cap: usize) -> BusinessRuleAdjuster {
        BusinessRuleAdjuster::new(RuleSet::standard(1.5, 0.8), cap)
    }

    #[test]
    fn cross_category_pair_is_boosted_over_same_category() {
        let mut metadata = HashMap::new();
        metadata.insert(ProductId(1), meta(None, 10, "Electronics"));
        metadata.insert(ProductId(2), meta(None, 11, "Electronics"));
        metadata.insert(ProductId(3), meta(None, 20, "Kitchen"));

        let result =
            adjuster(50).adjust(vec![scored(1, 2, 10), scored(1, 3, 10)], &metadata);

        let by_pair: HashMap<_, _> =
            result.pairs.iter().map(|p| (p.pair, p.frequency)).collect();
        let same_category = by_pair[&scored(1, 2, 0).pair];
        let cross_category = by_pair[&scored(1, 3, 0).pair];

        assert_eq!(same_category, 10);
        assert_eq!(cross_category, 15);
        assert!(cross_category >= same_category);
    }

    #[test]
    fn same_brand_pair_is_penalized() {
        let mut metadata = HashMap::new();
        metadata.insert(ProductId(1), meta(Some("Acme"), 10, "Electronics"));
        metadata.insert(ProductId(2), meta(Some("Acme"), 10, "Electronics"));

        let result = adjuster(50).adjust(vec![scored(1, 2, 10)], &metadata);

        assert_eq!(result.pairs[0].frequency, 8);
    }

    #[test]
    fn generic_brand_escapes_the_penalty() {
        let mut metadata = HashMap::new();
        metadata.insert(ProductId(1), meta(Some("Generic"), 10, "Electronics"));
        metadata.insert(ProductId(2), meta(Some("Generic"), 10, "Electronics"));

        let result = adjuster(50).adjust(vec![scored(1, 2, 10)], &metadata);

        assert_eq!(result.pairs[0].frequency, 10);
    }

    #[test]
    fn adjusted_frequency_never_drops_below_one() {
        let mut metadata = HashMap::new();
        metadata.insert(ProductId(1), meta(Some("Acme"), 10, "Electronics"));
        metadata.insert(ProductId(2), meta(Some("Acme"), 10, "Electronics"));

        let result = adjuster(50).adjust(vec![scored(1, 2, 1)], &metadata);

        assert_eq!(result.pairs[0].frequency, 1);
    }

    #[test]
    fn rules_compose_in_order() {
        let rules = RuleSet::standard(1.5, 0.8);
        let meta_a = meta(Some("Acme"), 10, "Electronics");
        let meta_b = meta(Some("Acme"), 20, "Kitchen");

        let factor = rules.multiplier(&PairMeta { a: &meta_a, b: &meta_b });

        assert!((factor - 1.2).abs() < 1e-9);
    }

    #[test]
    fn missing_metadata_skips_the_pair() {
        let mut metadata = HashMap::new();
        metadata.insert(ProductId(1), meta(None, 10, "Electronics"));

        let result = adjuster(50).adjust(vec![scored(1, 2, 10)], &metadata);

        assert!(result.pairs.is_empty());
        assert_eq!(result.dropped_missing_metadata, 1);
    }

    #[test]
    fn cap_limits_each_endpoint_and_keeps_strongest_edges() {
        let mut metadata = HashMap::new();
        for product in 1..=5 {
            metadata.insert(ProductId(product), meta(None, product, "Root"));
        }

        // Product 1 anchors four pairs with distinct frequencies; cap 2
        // keeps the two strongest.
        let pairs = vec![
            scored(1, 2, 9),
            scored(1, 3, 7),
            scored(1, 4, 5),
            scored(1, 5, 3),
        ];

        let result = adjuster(2).adjust(pairs, &metadata);

        assert_eq!(result.pairs.len(), 2);
        assert_eq!(result.dropped_by_cap, 2);
        assert!(result.pairs.iter().all(|p| p.frequency >= 7));

        let mut endpoint_counts: HashMap<ProductId, usize> = HashMap::new();
        for pair in &result.pairs {
            *endpoint_counts.entry(pair.pair.product_a()).or_insert(0) += 1;
            *endpoint_counts.entry(pair.pair.product_b()).or_insert(0) += 1;
        }
        assert!(endpoint_counts.values().all(|&count| count <= 2));
    }
}
