use std::collections::{BTreeSet, VecDeque};
use std::iter::Peekable;

use chrono::{DateTime, Utc};

use crate::domain::association::PairKey;
use crate::domain::catalog::ProductId;
use crate::domain::order::{LineItemRow, OrderId};

/// One canonical pair observed in one order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoOccurrence {
    pub pair: PairKey,
    pub order_id: OrderId,
    pub placed_at: DateTime<Utc>,
}

/// Turns line-item rows into canonical per-order product pairs.
///
/// Input rows must be grouped by order id (the order-history queries sort by
/// it). Repeated products within an order are deduplicated, so each pair is
/// emitted at most once per order; orders with a single distinct product
/// emit nothing. The extractor is pure over its input: re-running it over
/// the same rows yields the same co-occurrences.
pub struct PairExtractor<I: Iterator<Item = LineItemRow>> {
    rows: Peekable<I>,
    pending: VecDeque<CoOccurrence>,
}

impl<I: Iterator<Item = LineItemRow>> PairExtractor<I> {
    pub fn new(rows: I) -> Self {
        Self { rows: rows.peekable(), pending: VecDeque::new() }
    }

    fn fill_from_next_order(&mut self) {
        while self.pending.is_empty() {
            let first = match self.rows.next() {
                Some(row) => row,
                None => return,
            };

            let order_id = first.order_id;
            let placed_at = first.placed_at;
            let mut products: BTreeSet<ProductId> = BTreeSet::new();
            products.insert(first.product_id);

            while let Some(row) = self.rows.next_if(|row| row.order_id == order_id) {
                products.insert(row.product_id);
            }

            let products: Vec<ProductId> = products.into_iter().collect();
            for (index, &left) in products.iter().enumerate() {
                for &right in &products[index + 1..] {
                    if let Some(pair) = PairKey::new(left, right) {
                        self.pending.push_back(CoOccurrence { pair, order_id, placed_at });
                    }
                }
            }
        }
    }
}

impl<I: Iterator<Item = LineItemRow>> Iterator for PairExtractor<I> {
    type Item = CoOccurrence;

    fn next(&mut self) -> Option<CoOccurrence> {
        if self.pending.is_empty() {
            self.fill_from_next_order();
        }
        self.pending.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use crate::domain::association::PairKey;
    use crate::domain::catalog::ProductId;
    use crate::domain::order::{LineItemRow, OrderId};

    use super::PairExtractor;

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn row(order: i64, product: i64) -> LineItemRow {
        LineItemRow {
            order_id: OrderId(order),
            product_id: ProductId(product),
            placed_at: parse_ts("2026-01-10T09:00:00Z"),
        }
    }

    fn pair(a: i64, b: i64) -> PairKey {
        PairKey::new(ProductId(a), ProductId(b)).expect("distinct products")
    }

    #[test]
    fn emits_all_unordered_pairs_per_order() {
        let rows = vec![row(1, 3), row(1, 1), row(1, 2)];
        let pairs: Vec<PairKey> = PairExtractor::new(rows.into_iter()).map(|c| c.pair).collect();

        assert_eq!(pairs, vec![pair(1, 2), pair(1, 3), pair(2, 3)]);
    }

    #[test]
    fn duplicate_line_items_in_one_order_collapse() {
        let rows = vec![row(4, 9), row(4, 9), row(4, 9), row(4, 5)];
        let occurrences: Vec<_> = PairExtractor::new(rows.into_iter()).collect();

        assert_eq!(occurrences.len(), 1);
        assert_eq!(occurrences[0].pair, pair(5, 9));
        assert_eq!(occurrences[0].order_id, OrderId(4));
    }

    #[test]
    fn single_product_orders_contribute_nothing() {
        let rows = vec![row(1, 7), row(2, 7), row(2, 7)];
        assert_eq!(PairExtractor::new(rows.into_iter()).count(), 0);
    }

    #[test]
    fn spans_multiple_orders_in_sequence() {
        let rows = vec![row(1, 1), row(1, 2), row(2, 2), row(2, 3), row(3, 5)];
        let pairs: Vec<(OrderId, PairKey)> =
            PairExtractor::new(rows.into_iter()).map(|c| (c.order_id, c.pair)).collect();

        assert_eq!(pairs, vec![(OrderId(1), pair(1, 2)), (OrderId(2), pair(2, 3))]);
    }

    #[test]
    fn rerunning_over_the_same_rows_is_stable() {
        let rows = vec![row(1, 2), row(1, 8), row(1, 4), row(2, 8), row(2, 2)];
        let first: Vec<_> = PairExtractor::new(rows.clone().into_iter()).collect();
        let second: Vec<_> = PairExtractor::new(rows.into_iter()).collect();

        assert_eq!(first, second);
    }
}
