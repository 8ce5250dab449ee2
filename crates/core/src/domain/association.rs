use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::ProductId;

/// Canonical undirected edge between two products. The smaller id is always
/// stored first, so a pair and its reverse collapse to one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairKey {
    product_a: ProductId,
    product_b: ProductId,
}

impl PairKey {
    /// Builds the canonical key; `None` when both sides are the same product.
    pub fn new(left: ProductId, right: ProductId) -> Option<Self> {
        match left.cmp(&right) {
            std::cmp::Ordering::Less => Some(Self { product_a: left, product_b: right }),
            std::cmp::Ordering::Greater => Some(Self { product_a: right, product_b: left }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn product_a(&self) -> ProductId {
        self.product_a
    }

    pub fn product_b(&self) -> ProductId {
        self.product_b
    }

    pub fn contains(&self, product: ProductId) -> bool {
        self.product_a == product || self.product_b == product
    }
}

/// A pair with its computed frequency, ready to be written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScoredPair {
    pub pair: PairKey,
    pub frequency: i64,
    pub last_order_at: DateTime<Utc>,
}

/// A persisted association row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Association {
    pub pair: PairKey,
    pub frequency_count: i64,
    pub last_calculated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use crate::domain::catalog::ProductId;

    use super::PairKey;

    #[test]
    fn pair_key_is_canonical_regardless_of_argument_order() {
        let forward = PairKey::new(ProductId(7), ProductId(3)).expect("distinct products");
        let reverse = PairKey::new(ProductId(3), ProductId(7)).expect("distinct products");

        assert_eq!(forward, reverse);
        assert_eq!(forward.product_a(), ProductId(3));
        assert_eq!(forward.product_b(), ProductId(7));
        assert!(forward.product_a() < forward.product_b());
    }

    #[test]
    fn self_pair_is_rejected() {
        assert_eq!(PairKey::new(ProductId(5), ProductId(5)), None);
    }

    #[test]
    fn contains_checks_both_endpoints() {
        let pair = PairKey::new(ProductId(1), ProductId(2)).expect("distinct products");
        assert!(pair.contains(ProductId(1)));
        assert!(pair.contains(ProductId(2)));
        assert!(!pair.contains(ProductId(3)));
    }
}
