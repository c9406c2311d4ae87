//! Document line items.

use serde::{Deserialize, Serialize};

use tradebook_core::{DocumentId, LineId, TenantId, VariantId};

/// Direction of a stock adjustment line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentDirection {
    In,
    Out,
}

/// Kind-specific payload of a line.
///
/// Purchase lines carry a unit *cost*, sale lines a unit *price*; the two are
/// mutually exclusive by construction. Return lines point back at the
/// purchase/sale line they reduce. Adjustment lines declare a direction and
/// an optional cost (zero for pure quantity corrections).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineDetail {
    Purchase {
        /// Unit cost in smallest currency unit.
        unit_cost: i64,
        discount: i64,
        cost_total: i64,
    },
    Sale {
        /// Unit price in smallest currency unit.
        unit_price: i64,
        discount: i64,
        /// Cost of goods sold for the line, captured at posting time.
        cost_total: i64,
    },
    Return {
        /// The original purchase/sale line this return reduces.
        source_line_id: LineId,
    },
    Adjustment {
        direction: AdjustmentDirection,
        /// Zero or caller-supplied cost per unit.
        unit_cost: i64,
        reason: Option<String>,
    },
}

/// One line of a [`crate::Document`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub id: LineId,
    pub document_id: DocumentId,
    pub tenant_id: TenantId,
    pub variant_id: VariantId,
    /// Strictly positive; the movement type, not the sign, encodes direction.
    pub quantity: i64,
    /// Line total in smallest currency unit (after discount).
    pub line_total: i64,
    pub detail: LineDetail,
}

impl DocumentLine {
    /// Unit amount the discount ceiling is checked against, if the kind has one.
    pub fn unit_amount(&self) -> Option<i64> {
        match &self.detail {
            LineDetail::Purchase { unit_cost, .. } => Some(*unit_cost),
            LineDetail::Sale { unit_price, .. } => Some(*unit_price),
            LineDetail::Return { .. } | LineDetail::Adjustment { .. } => None,
        }
    }

    pub fn discount(&self) -> i64 {
        match &self.detail {
            LineDetail::Purchase { discount, .. } | LineDetail::Sale { discount, .. } => *discount,
            _ => 0,
        }
    }
}
