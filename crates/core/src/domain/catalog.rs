use serde::{Deserialize, Serialize};

/// Brand treated as "no brand" by the same-brand rule.
pub const GENERIC_BRAND: &str = "Generic";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub i64);

/// Metadata a pair needs before it can be scored. Derived from the catalog
/// for active products only; pairs referencing products without an entry
/// are skipped by the rule adjuster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductMeta {
    pub brand: Option<String>,
    pub category_id: CategoryId,
    pub root_category: String,
}

impl ProductMeta {
    /// A brand that participates in the same-brand penalty: present and
    /// not the generic placeholder.
    pub fn distinct_brand(&self) -> Option<&str> {
        self.brand.as_deref().filter(|brand| *brand != GENERIC_BRAND)
    }
}
