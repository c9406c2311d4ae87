//! Inventory movement ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradebook_core::{DocumentId, EntryId, LineId, TenantId, VariantId};

/// What kind of stock event a movement records.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    PurchaseIn,
    SaleOut,
    SupplierReturnOut,
    CustomerReturnIn,
    AdjustmentIn,
    AdjustmentOut,
}

/// Signed direction of a movement type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementDirection {
    In,
    Out,
}

impl MovementType {
    pub fn direction(&self) -> MovementDirection {
        match self {
            MovementType::PurchaseIn
            | MovementType::CustomerReturnIn
            | MovementType::AdjustmentIn => MovementDirection::In,
            MovementType::SaleOut
            | MovementType::SupplierReturnOut
            | MovementType::AdjustmentOut => MovementDirection::Out,
        }
    }
}

/// One stock event for a product variant. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub id: EntryId,
    pub tenant_id: TenantId,
    pub document_id: DocumentId,
    pub line_id: LineId,
    pub variant_id: VariantId,
    pub movement_type: MovementType,
    /// Strictly positive; direction comes from the movement type.
    pub quantity: i64,
    /// Unit cost at the time of the event, smallest currency unit.
    pub unit_cost_at: i64,
    pub occurred_at: DateTime<Utc>,
}

impl InventoryMovement {
    /// Quantity with its sign applied (IN positive, OUT negative).
    pub fn signed_quantity(&self) -> i64 {
        match self.movement_type.direction() {
            MovementDirection::In => self.quantity,
            MovementDirection::Out => -self.quantity,
        }
    }
}

/// On-hand quantity for a variant: signed sum of its movements.
pub fn on_hand<'a>(movements: impl IntoIterator<Item = &'a InventoryMovement>) -> i64 {
    movements.into_iter().map(|m| m.signed_quantity()).sum()
}
