//! SALE posting: stock out at the current average cost, AR up.
//!
//! The average is read, never recomputed: cost of goods sold uses the
//! snapshot at read time, so a sale leaves `avg_cost` untouched.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use tradebook_core::{EntryId, PartyRef, VariantId};
use tradebook_ledgers::{FinancialEntryType, FinancialLedgerEntry, InventoryMovement, MovementType};
use tradebook_model::{Document, DocumentLine, LineDetail, SaleDetails};
use tradebook_store::PostingTx;

use crate::engine::{flip_and_number, write_settlement, Settlement, StockGuard};
use crate::error::PostingError;

pub(crate) async fn post<T: PostingTx>(
    tx: &mut T,
    document: &mut Document,
    lines: &[DocumentLine],
    details: &SaleDetails,
    settlement: Option<&Settlement>,
    idempotency_key: &str,
    now: DateTime<Utc>,
) -> Result<(), PostingError> {
    // First pass, no writes: check every line and report the complete list
    // of shortfalls, so a multi-line order can be corrected in one round trip.
    let mut guard = StockGuard::new();
    for line in lines {
        guard
            .reserve(tx, document.tenant_id, line.id, line.variant_id, line.quantity)
            .await?;
    }
    guard.finish()?;

    // Cost snapshot per variant.
    let mut costs: HashMap<VariantId, i64> = HashMap::new();
    for line in lines {
        if !costs.contains_key(&line.variant_id) {
            let variant = tx
                .variant(document.tenant_id, line.variant_id)
                .await?
                .ok_or_else(|| {
                    PostingError::not_found(format!("variant {}", line.variant_id))
                })?;
            costs.insert(line.variant_id, variant.avg_cost);
        }
    }

    let paid_now = settlement.map(|s| s.amount).unwrap_or(0);
    flip_and_number(tx, document, idempotency_key, paid_now, now).await?;

    for line in lines {
        let avg_cost = costs.get(&line.variant_id).copied().unwrap_or(0);
        tx.insert_movement(&InventoryMovement {
            id: EntryId::new(),
            tenant_id: document.tenant_id,
            document_id: document.id,
            line_id: line.id,
            variant_id: line.variant_id,
            movement_type: MovementType::SaleOut,
            quantity: line.quantity,
            unit_cost_at: avg_cost,
            occurred_at: now,
        })
        .await?;

        // Capture cost of goods sold on the line.
        if let LineDetail::Sale { unit_price, discount, .. } = line.detail {
            let mut updated = line.clone();
            updated.detail = LineDetail::Sale {
                unit_price,
                discount,
                cost_total: avg_cost.saturating_mul(line.quantity),
            };
            tx.update_line(&updated).await?;
        }
    }

    let party = PartyRef::Customer(details.customer_id);
    tx.insert_financial_entry(&FinancialLedgerEntry {
        id: EntryId::new(),
        tenant_id: document.tenant_id,
        document_id: document.id,
        entry_type: FinancialEntryType::ArIncrease,
        party,
        amount: details.total_amount,
        occurred_at: now,
    })
    .await?;

    if let Some(settlement) = settlement {
        write_settlement(tx, document, party, settlement, now).await?;
    }

    Ok(())
}
