use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::ProductId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "processing" => Some(Self::Processing),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Only successful orders participate in aggregation.
    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Shipped | Self::Delivered)
    }

    pub fn successful() -> [Self; 3] {
        [Self::Confirmed, Self::Shipped, Self::Delivered]
    }
}

/// One qualifying line item: the order it belongs to, the product, and the
/// order's placement time (carried along for recency weighting).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineItemRow {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub placed_at: DateTime<Utc>,
}

/// Closed analysis window over order placement times.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnalysisWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AnalysisWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// The trailing window ending at `reference`, the engine's default.
    pub fn trailing_days(reference: DateTime<Utc>, days: u32) -> Option<Self> {
        Self::new(reference - Duration::days(i64::from(days)), reference)
    }
}
