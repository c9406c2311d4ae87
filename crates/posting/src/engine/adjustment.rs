//! ADJUSTMENT posting.
//!
//! A pure quantity correction: one movement per line in the line's declared
//! direction, at zero or caller-supplied cost, and no financial-ledger
//! effect. OUT lines are shortfall-checked the same way a sale is — the
//! stock floor is global, and IN lines earlier in the document count toward
//! what later OUT lines may take.

use chrono::{DateTime, Utc};

use tradebook_core::EntryId;
use tradebook_ledgers::{InventoryMovement, MovementType};
use tradebook_model::{AdjustmentDirection, Document, DocumentLine, LineDetail};
use tradebook_store::PostingTx;

use crate::engine::{flip_and_number, StockGuard};
use crate::error::PostingError;

pub(crate) async fn post<T: PostingTx>(
    tx: &mut T,
    document: &mut Document,
    lines: &[DocumentLine],
    idempotency_key: &str,
    now: DateTime<Utc>,
) -> Result<(), PostingError> {
    let mut guard = StockGuard::new();
    for line in lines {
        let LineDetail::Adjustment { direction, .. } = line.detail else {
            continue; // excluded by validate_for_posting
        };
        match direction {
            AdjustmentDirection::In => {
                guard
                    .credit(tx, document.tenant_id, line.variant_id, line.quantity)
                    .await?;
            }
            AdjustmentDirection::Out => {
                guard
                    .reserve(tx, document.tenant_id, line.id, line.variant_id, line.quantity)
                    .await?;
            }
        }
    }
    guard.finish()?;

    flip_and_number(tx, document, idempotency_key, 0, now).await?;

    for line in lines {
        let LineDetail::Adjustment { direction, unit_cost, .. } = &line.detail else {
            continue;
        };
        let movement_type = match direction {
            AdjustmentDirection::In => MovementType::AdjustmentIn,
            AdjustmentDirection::Out => MovementType::AdjustmentOut,
        };
        tx.insert_movement(&InventoryMovement {
            id: EntryId::new(),
            tenant_id: document.tenant_id,
            document_id: document.id,
            line_id: line.id,
            variant_id: line.variant_id,
            movement_type,
            quantity: line.quantity,
            unit_cost_at: *unit_cost,
            occurred_at: now,
        })
        .await?;
    }

    Ok(())
}
