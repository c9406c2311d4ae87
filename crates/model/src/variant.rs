//! Product variants.

use serde::{Deserialize, Serialize};

use tradebook_core::{TenantId, VariantId};

/// The stock-keeping unit stock and cost are tracked on.
///
/// `avg_cost` is the weighted-average unit cost: recomputed by the posting
/// engine on every purchase (and adjusted on supplier returns), read but
/// never written by sale postings. On-hand quantity is not stored here; it
/// is always the signed sum of inventory movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: VariantId,
    pub tenant_id: TenantId,
    pub sku: String,
    pub name: String,
    /// Weighted-average unit cost in smallest currency unit.
    pub avg_cost: i64,
}
